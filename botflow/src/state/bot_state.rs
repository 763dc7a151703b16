//! A named, persisted state scope.

use super::{
    CachedBotState, ConversationKey, PrivateConversationKey, StatePropertyAccessor,
    StorageKeyFactory, UserKey,
};
use crate::config::StateConfig;
use crate::context::TurnContext;
use crate::errors::{BotflowError, Result};
use crate::middleware::{Middleware, Next};
use crate::storage::{Storage, StoreItem, StoreItems, WILDCARD_ETAG};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// One logical state bucket (per user, per conversation, ...).
///
/// A `BotState` lives as long as the bot and is shared across turns. The
/// document for the current turn is cached in the turn's service registry, so
/// each turn reads storage at most once per scope and writes only when the
/// document changed.
pub struct BotState {
    name: String,
    storage: Arc<dyn Storage>,
    key_factory: Arc<dyn StorageKeyFactory>,
    config: StateConfig,
    cache_key: String,
}

impl BotState {
    /// Creates a scope with a custom key derivation.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        storage: Arc<dyn Storage>,
        key_factory: Arc<dyn StorageKeyFactory>,
    ) -> Self {
        let name = name.into();
        let cache_key = format!("botflow.state.{name}.{}", Uuid::new_v4());
        Self {
            name,
            storage,
            key_factory,
            config: StateConfig::default(),
            cache_key,
        }
    }

    /// Per-user state, keyed `{channel}/users/{user}`.
    #[must_use]
    pub fn user(storage: Arc<dyn Storage>) -> Self {
        Self::new("UserState", storage, Arc::new(UserKey))
    }

    /// Per-conversation state, keyed `{channel}/conversations/{conversation}`.
    #[must_use]
    pub fn conversation(storage: Arc<dyn Storage>) -> Self {
        Self::new("ConversationState", storage, Arc::new(ConversationKey))
    }

    /// Per-user-in-conversation state, keyed `{channel}/conversations/{conversation}/users/{user}`.
    #[must_use]
    pub fn private_conversation(storage: Arc<dyn Storage>) -> Self {
        Self::new(
            "PrivateConversationState",
            storage,
            Arc::new(PrivateConversationKey),
        )
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: StateConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the scope name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Returns the registry key this scope caches its document under.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Derives the storage key for the turn.
    pub fn storage_key(&self, ctx: &TurnContext) -> Result<String> {
        self.key_factory.storage_key(ctx.activity(), &self.config)
    }

    /// Returns the turn's cached document, if this scope was loaded.
    #[must_use]
    pub fn cached_state(&self, ctx: &TurnContext) -> Option<Arc<CachedBotState>> {
        ctx.services().get::<CachedBotState>(&self.cache_key)
    }

    /// Loads the scope into the turn. A no-op if already loaded, unless `force`.
    pub async fn load(&self, ctx: &TurnContext, force: bool) -> Result<()> {
        if !force && self.cached_state(ctx).is_some() {
            trace!(state = %self.name, "State already loaded");
            return Ok(());
        }

        let key = self.storage_key(ctx)?;
        ctx.check_cancelled()?;

        let mut items = self
            .storage
            .read(std::slice::from_ref(&key), ctx.cancellation())
            .await?;
        let StoreItem { data, e_tag } = items.remove(&key).unwrap_or_default();

        debug!(
            state = %self.name,
            storage_key = %key,
            found = e_tag.is_some() || !data.is_empty(),
            "Loaded state"
        );

        // Another load of this scope may have registered the entry while the read was pending.
        match self.cached_state(ctx) {
            Some(_) if !force => trace!(state = %self.name, "State loaded concurrently"),
            Some(cached) => cached.reset(data, e_tag),
            None => ctx
                .services()
                .add(self.cache_key.clone(), Arc::new(CachedBotState::new(data, e_tag)))?,
        }
        Ok(())
    }

    /// Writes the cached document if it changed since the last load or save.
    ///
    /// With `force`, writes regardless, loading the scope first if this turn
    /// never touched it.
    pub async fn save_changes(&self, ctx: &TurnContext, force: bool) -> Result<()> {
        let cached = match self.cached_state(ctx) {
            Some(cached) => cached,
            None if force => {
                self.load(ctx, false).await?;
                self.cached_state(ctx).ok_or_else(|| self.not_loaded())?
            }
            None => return Ok(()),
        };

        if !force && !cached.is_changed() {
            trace!(state = %self.name, "State unchanged, skipping save");
            return Ok(());
        }

        let key = self.storage_key(ctx)?;
        ctx.check_cancelled()?;

        let (data, hash) = cached.snapshot();
        let e_tag = if self.config.last_writer_wins {
            Some(WILDCARD_ETAG.to_string())
        } else {
            cached.e_tag()
        };

        let changes = StoreItems::from([(key.clone(), StoreItem { data, e_tag })]);
        let mut tags = self.storage.write(changes, ctx.cancellation()).await?;
        cached.mark_saved(hash, tags.remove(&key));

        debug!(state = %self.name, storage_key = %key, "Saved state");
        Ok(())
    }

    /// Empties the cached document. Storage is untouched until the next save.
    pub fn clear_state(&self, ctx: &TurnContext) -> Result<()> {
        match self.cached_state(ctx) {
            Some(cached) => cached.clear(),
            None => {
                let cached = CachedBotState::default();
                cached.clear();
                ctx.services().add(self.cache_key.clone(), Arc::new(cached))?;
            }
        }
        Ok(())
    }

    /// Drops the cached document and deletes the scope's item from storage.
    pub async fn delete(&self, ctx: &TurnContext) -> Result<()> {
        let key = self.storage_key(ctx)?;
        ctx.services().remove(&self.cache_key);
        self.storage
            .delete(std::slice::from_ref(&key), ctx.cancellation())
            .await?;
        debug!(state = %self.name, storage_key = %key, "Deleted state");
        Ok(())
    }

    /// Returns a property, loading the scope on first access.
    pub async fn get_property_value<T>(&self, ctx: &TurnContext, name: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let cached = self.loaded(ctx).await?;
        cached
            .get(name)
            .map(|value| serde_json::from_value(value).map_err(BotflowError::from))
            .transpose()
    }

    /// Sets a property, loading the scope on first access.
    pub async fn set_property_value<T>(&self, ctx: &TurnContext, name: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.loaded(ctx).await?.set(name, value);
        Ok(())
    }

    /// Removes a property, loading the scope on first access.
    pub async fn delete_property_value(&self, ctx: &TurnContext, name: &str) -> Result<()> {
        self.loaded(ctx).await?.remove(name);
        Ok(())
    }

    /// Creates a typed accessor whose default is `T::default()`.
    #[must_use]
    pub fn create_property<T>(self: &Arc<Self>, name: impl Into<String>) -> StatePropertyAccessor<T>
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
    {
        StatePropertyAccessor::new(self.clone(), name, T::default)
    }

    /// Creates a typed accessor whose default is a clone of `default`.
    #[must_use]
    pub fn create_property_with_default<T>(
        self: &Arc<Self>,
        name: impl Into<String>,
        default: T,
    ) -> StatePropertyAccessor<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        StatePropertyAccessor::new(self.clone(), name, move || default.clone())
    }

    /// Creates a typed accessor whose default comes from `factory`.
    #[must_use]
    pub fn create_property_with_factory<T, F>(
        self: &Arc<Self>,
        name: impl Into<String>,
        factory: F,
    ) -> StatePropertyAccessor<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        StatePropertyAccessor::new(self.clone(), name, factory)
    }

    async fn loaded(&self, ctx: &TurnContext) -> Result<Arc<CachedBotState>> {
        self.load(ctx, false).await?;
        self.cached_state(ctx).ok_or_else(|| self.not_loaded())
    }

    fn not_loaded(&self) -> BotflowError {
        BotflowError::invalid_state(format!("{}: state was not loaded for this turn", self.name))
    }
}

impl std::fmt::Debug for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotState")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("cache_key", &self.cache_key)
            .finish_non_exhaustive()
    }
}

/// Loads the scope on the way in and saves it on the way out.
#[async_trait]
impl Middleware for BotState {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_turn(&self, ctx: &TurnContext, next: Next<'_>) -> Result<()> {
        self.load(ctx, true).await?;
        next.run().await?;
        self.save_changes(ctx, false).await
    }
}
