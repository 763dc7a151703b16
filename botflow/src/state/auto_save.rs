//! Saves state after the bot runs.

use super::{BotState, BotStateSet};
use crate::context::TurnContext;
use crate::errors::Result;
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use std::sync::Arc;

/// Saves every changed scope once the rest of the pipeline has finished.
///
/// Register it with [`crate::middleware::MiddlewareSet::add_auto_save`] so it
/// is the outermost handler and its save observes every mutation. It never
/// loads state; scopes load lazily on first property access. Nothing is saved
/// if the inner pipeline fails.
#[derive(Debug, Clone, Default)]
pub struct AutoSaveStateMiddleware {
    states: BotStateSet,
}

impl AutoSaveStateMiddleware {
    /// Creates the middleware for the given scopes.
    #[must_use]
    pub fn new(states: impl IntoIterator<Item = Arc<BotState>>) -> Self {
        Self {
            states: BotStateSet::new(states),
        }
    }

    /// Creates the middleware from an existing set.
    #[must_use]
    pub fn from_set(states: BotStateSet) -> Self {
        Self { states }
    }

    /// Adds a scope.
    pub fn add(&mut self, state: Arc<BotState>) -> &mut Self {
        self.states.add(state);
        self
    }

    /// Returns the scopes saved by this middleware.
    #[must_use]
    pub fn bot_state_set(&self) -> &BotStateSet {
        &self.states
    }
}

#[async_trait]
impl Middleware for AutoSaveStateMiddleware {
    async fn on_turn(&self, ctx: &TurnContext, next: Next<'_>) -> Result<()> {
        next.run().await?;
        self.states.save_all_changes(ctx, false).await
    }
}
