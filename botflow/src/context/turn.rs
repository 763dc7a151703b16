//! The context for one turn through the pipeline.

use super::hooks::{
    DeleteActivityHook, DeleteNext, HookNext, SendActivitiesHook, SendNext, UpdateActivityHook,
    UpdateNext,
};
use super::{Activity, ConversationReference, ResourceResponse, TurnServiceRegistry};
use crate::adapter::BotAdapter;
use crate::cancellation::CancellationToken;
use crate::errors::{BotflowError, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Carries the inbound activity, the turn's services, and the adapter that produced it.
///
/// A context is owned by exactly one pipeline run and is never shared across turns.
pub struct TurnContext {
    /// Unique id for this turn, used in logs.
    turn_id: Uuid,
    /// The adapter that created the turn.
    adapter: Arc<dyn BotAdapter>,
    /// The inbound activity.
    activity: Activity,
    /// Turn-scoped services, including cached bot state.
    services: TurnServiceRegistry,
    /// Cancellation for every suspending operation in the turn.
    cancellation: Arc<CancellationToken>,
    /// Whether at least one activity was sent.
    responded: AtomicBool,
    send_hooks: Mutex<Vec<SendActivitiesHook>>,
    update_hooks: Mutex<Vec<UpdateActivityHook>>,
    delete_hooks: Mutex<Vec<DeleteActivityHook>>,
}

impl TurnContext {
    /// Creates a turn context for an inbound activity.
    #[must_use]
    pub fn new(adapter: Arc<dyn BotAdapter>, activity: Activity) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            adapter,
            activity,
            services: TurnServiceRegistry::new(),
            cancellation: Arc::new(CancellationToken::new()),
            responded: AtomicBool::new(false),
            send_hooks: Mutex::new(Vec::new()),
            update_hooks: Mutex::new(Vec::new()),
            delete_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the turn id.
    #[must_use]
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Returns the adapter that created this turn.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn BotAdapter> {
        &self.adapter
    }

    /// Returns the inbound activity.
    #[must_use]
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Returns the turn-scoped service registry.
    #[must_use]
    pub fn services(&self) -> &TurnServiceRegistry {
        &self.services
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Fails with `Cancelled` if the turn has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancellation.check()
    }

    /// Returns true once any activity has been sent during this turn.
    #[must_use]
    pub fn responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    /// Sends a text reply to the sender of the inbound activity.
    pub async fn send_activity(&self, text: impl Into<String>) -> Result<ResourceResponse> {
        let reply = self.activity.create_reply(text);
        let mut responses = self.send_activities(vec![reply]).await?;
        Ok(responses.pop().unwrap_or_default())
    }

    /// Sends activities through the send hooks and then the adapter.
    ///
    /// An empty list returns at once without running hooks. The turn counts
    /// as responded only if the adapter was reached.
    pub async fn send_activities(
        &self,
        activities: Vec<Activity>,
    ) -> Result<Vec<ResourceResponse>> {
        self.check_cancelled()?;
        if activities.is_empty() {
            return Ok(Vec::new());
        }

        let hooks = self.send_hooks.lock().clone();
        HookNext::new(self, &hooks[..], Self::deliver).run(activities).await
    }

    /// Replaces a previously sent activity, matched by its id.
    pub async fn update_activity(&self, activity: Activity) -> Result<ResourceResponse> {
        let hooks = self.update_hooks.lock().clone();
        HookNext::new(self, &hooks[..], Self::replace).run(activity).await
    }

    /// Deletes a previously sent activity from this turn's conversation.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `activity_id` is blank.
    pub async fn delete_activity(&self, activity_id: &str) -> Result<()> {
        if activity_id.trim().is_empty() {
            return Err(BotflowError::invalid_state("delete_activity: activity id is empty"));
        }

        let mut reference = self.activity.conversation_reference();
        reference.activity_id = Some(activity_id.to_string());
        self.delete_activity_at(reference).await
    }

    /// Deletes the activity a conversation reference points at.
    pub async fn delete_activity_at(&self, reference: ConversationReference) -> Result<()> {
        let hooks = self.delete_hooks.lock().clone();
        HookNext::new(self, &hooks[..], Self::remove).run(reference).await
    }

    /// Registers a hook around every later send in this turn.
    pub fn on_send_activities<F>(&self, hook: F) -> &Self
    where
        F: for<'a> Fn(
                &'a TurnContext,
                Vec<Activity>,
                SendNext<'a>,
            ) -> BoxFuture<'a, Result<Vec<ResourceResponse>>>
            + Send
            + Sync
            + 'static,
    {
        self.send_hooks.lock().push(Arc::new(hook));
        self
    }

    /// Registers a hook around every later update in this turn.
    pub fn on_update_activity<F>(&self, hook: F) -> &Self
    where
        F: for<'a> Fn(
                &'a TurnContext,
                Activity,
                UpdateNext<'a>,
            ) -> BoxFuture<'a, Result<ResourceResponse>>
            + Send
            + Sync
            + 'static,
    {
        self.update_hooks.lock().push(Arc::new(hook));
        self
    }

    /// Registers a hook around every later delete in this turn.
    pub fn on_delete_activity<F>(&self, hook: F) -> &Self
    where
        F: for<'a> Fn(
                &'a TurnContext,
                ConversationReference,
                DeleteNext<'a>,
            ) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.delete_hooks.lock().push(Arc::new(hook));
        self
    }

    fn deliver(
        ctx: &TurnContext,
        activities: Vec<Activity>,
    ) -> BoxFuture<'_, Result<Vec<ResourceResponse>>> {
        Box::pin(async move {
            if activities.is_empty() {
                return Ok(Vec::new());
            }
            let count = activities.len();
            let responses = ctx.adapter.send_activities(ctx, activities).await?;
            ctx.responded.store(true, Ordering::SeqCst);
            debug!(turn_id = %ctx.turn_id, count, "Sent activities");
            Ok(responses)
        })
    }

    fn replace(ctx: &TurnContext, activity: Activity) -> BoxFuture<'_, Result<ResourceResponse>> {
        Box::pin(async move { ctx.adapter.update_activity(ctx, activity).await })
    }

    fn remove(ctx: &TurnContext, reference: ConversationReference) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { ctx.adapter.delete_activity(ctx, &reference).await })
    }
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("turn_id", &self.turn_id)
            .field("activity", &self.activity)
            .field("services", &self.services)
            .field("responded", &self.responded())
            .field("send_hooks", &self.send_hooks.lock().len())
            .field("update_hooks", &self.update_hooks.lock().len())
            .field("delete_hooks", &self.delete_hooks.lock().len())
            .finish_non_exhaustive()
    }
}
