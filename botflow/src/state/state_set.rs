//! Scopes that load and save together.

use super::BotState;
use crate::context::TurnContext;
use crate::errors::{BotflowError, Result};
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// An ordered set of shared [`BotState`] scopes.
///
/// A scope appears at most once: adding the same `Arc` again is a no-op, so a
/// set operation never runs two operations on one cache entry.
///
/// Set operations start every member's operation at once and finish when all
/// members finish or as soon as one fails. Members that already completed keep
/// their in-memory state; nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct BotStateSet {
    states: Vec<Arc<BotState>>,
}

impl BotStateSet {
    /// Creates a set from existing scopes.
    #[must_use]
    pub fn new(states: impl IntoIterator<Item = Arc<BotState>>) -> Self {
        let mut set = Self::default();
        for state in states {
            set.add(state);
        }
        set
    }

    /// Adds a scope unless this exact scope is already a member.
    pub fn add(&mut self, state: Arc<BotState>) -> &mut Self {
        if self.states.iter().any(|member| Arc::ptr_eq(member, &state)) {
            debug!(state = %state.name(), "Scope already in set, ignoring");
        } else {
            self.states.push(state);
        }
        self
    }

    /// Returns the member scopes.
    #[must_use]
    pub fn states(&self) -> &[Arc<BotState>] {
        &self.states
    }

    /// Returns the number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if the set has no scopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Loads every scope concurrently.
    pub async fn load_all(&self, ctx: &TurnContext, force: bool) -> Result<()> {
        debug!(states = self.states.len(), force, "Loading state set");
        join_or_cancel(ctx, self.states.iter().map(|s| s.load(ctx, force))).await
    }

    /// Saves every changed scope concurrently.
    pub async fn save_all_changes(&self, ctx: &TurnContext, force: bool) -> Result<()> {
        debug!(states = self.states.len(), force, "Saving state set");
        join_or_cancel(ctx, self.states.iter().map(|s| s.save_changes(ctx, force))).await
    }
}

/// Drives all operations concurrently. The first failure, or cancellation of
/// the turn, drops the operations still in flight.
async fn join_or_cancel<I, F>(ctx: &TurnContext, operations: I) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<()>>,
{
    ctx.check_cancelled()?;
    let all = try_join_all(operations);
    let cancellation = ctx.cancellation();

    tokio::select! {
        result = all => result.map(|_| ()),
        () = cancellation.cancelled() => Err(BotflowError::cancelled(
            cancellation.reason().unwrap_or_else(|| "cancelled".to_string()),
        )),
    }
}

/// Loads every scope (fresh from storage) on the way in and saves on the way out.
#[async_trait]
impl Middleware for BotStateSet {
    async fn on_turn(&self, ctx: &TurnContext, next: Next<'_>) -> Result<()> {
        self.load_all(ctx, true).await?;
        next.run().await?;
        self.save_all_changes(ctx, false).await
    }
}
