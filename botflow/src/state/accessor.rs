//! Typed property access with default values.

use super::BotState;
use crate::context::TurnContext;
use crate::errors::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

type DefaultFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A named, typed property of a [`BotState`].
///
/// Values round-trip through JSON, so `get` hands back an owned copy; call
/// `set` to persist changes to it.
pub struct StatePropertyAccessor<T> {
    state: Arc<BotState>,
    name: String,
    default: DefaultFactory<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StatePropertyAccessor<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates an accessor. Usually built through [`BotState::create_property`].
    #[must_use]
    pub fn new<F>(state: Arc<BotState>, name: impl Into<String>, default: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            state,
            name: name.into(),
            default: Arc::new(default),
            _marker: PhantomData,
        }
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scope this property lives in.
    #[must_use]
    pub fn state(&self) -> &Arc<BotState> {
        &self.state
    }

    /// Returns the value, or stores and returns the default if the property is unset.
    pub async fn get(&self, ctx: &TurnContext) -> Result<T> {
        if let Some(value) = self.state.get_property_value(ctx, &self.name).await? {
            return Ok(value);
        }

        let value = (self.default)();
        self.state.set_property_value(ctx, &self.name, &value).await?;
        Ok(value)
    }

    /// Returns the value without materializing a default.
    pub async fn get_optional(&self, ctx: &TurnContext) -> Result<Option<T>> {
        self.state.get_property_value(ctx, &self.name).await
    }

    /// Sets the value.
    pub async fn set(&self, ctx: &TurnContext, value: &T) -> Result<()> {
        self.state.set_property_value(ctx, &self.name, value).await
    }

    /// Removes the value.
    pub async fn delete(&self, ctx: &TurnContext) -> Result<()> {
        self.state.delete_property_value(ctx, &self.name).await
    }
}

impl<T> Clone for StatePropertyAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            name: self.name.clone(),
            default: self.default.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for StatePropertyAccessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePropertyAccessor")
            .field("state", &self.state.name())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
