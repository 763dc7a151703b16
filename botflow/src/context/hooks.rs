//! Per-turn interception of outbound activity operations.
//!
//! Hooks registered on a [`TurnContext`] wrap every send, update, and delete
//! issued during the turn. They run in registration order, each receiving the
//! value and a continuation for the rest of the chain, with the adapter call
//! at the end. A hook may change the value before passing it on, inspect the
//! result on the way back, or return without calling `next` to stop the
//! operation.

use super::{Activity, ConversationReference, ResourceResponse, TurnContext};
use crate::errors::Result;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::trace;

/// A hook for one kind of outbound operation taking `T` and producing `R`.
pub type ActivityHook<T, R> = Arc<
    dyn for<'a> Fn(&'a TurnContext, T, HookNext<'a, T, R>) -> BoxFuture<'a, Result<R>>
        + Send
        + Sync,
>;

/// Hook around [`TurnContext::send_activities`].
pub type SendActivitiesHook = ActivityHook<Vec<Activity>, Vec<ResourceResponse>>;
/// Hook around [`TurnContext::update_activity`].
pub type UpdateActivityHook = ActivityHook<Activity, ResourceResponse>;
/// Hook around [`TurnContext::delete_activity`].
pub type DeleteActivityHook = ActivityHook<ConversationReference, ()>;

/// Continuation handed to a send hook.
pub type SendNext<'a> = HookNext<'a, Vec<Activity>, Vec<ResourceResponse>>;
/// Continuation handed to an update hook.
pub type UpdateNext<'a> = HookNext<'a, Activity, ResourceResponse>;
/// Continuation handed to a delete hook.
pub type DeleteNext<'a> = HookNext<'a, ConversationReference, ()>;

/// The adapter call at the end of a hook chain.
pub(crate) type Terminal<T, R> = for<'b> fn(&'b TurnContext, T) -> BoxFuture<'b, Result<R>>;

/// The rest of a hook chain.
#[must_use = "the operation only proceeds if `run` is awaited"]
pub struct HookNext<'a, T, R> {
    ctx: &'a TurnContext,
    remaining: &'a [ActivityHook<T, R>],
    terminal: Terminal<T, R>,
}

impl<'a, T, R> HookNext<'a, T, R>
where
    T: Send + 'a,
    R: Send + 'a,
{
    pub(crate) fn new(
        ctx: &'a TurnContext,
        remaining: &'a [ActivityHook<T, R>],
        terminal: Terminal<T, R>,
    ) -> Self {
        Self {
            ctx,
            remaining,
            terminal,
        }
    }

    /// Passes `value` to the next hook, or to the adapter after the last one.
    ///
    /// Fails with `Cancelled` before entering the next link if the turn was cancelled.
    pub fn run(self, value: T) -> BoxFuture<'a, Result<R>> {
        let HookNext {
            ctx,
            remaining,
            terminal,
        } = self;

        Box::pin(async move {
            ctx.check_cancelled()?;

            match remaining.split_first() {
                Some((head, rest)) => {
                    trace!(remaining = rest.len(), "Entering activity hook");
                    (head.as_ref())(ctx, value, HookNext::new(ctx, rest, terminal)).await
                }
                None => terminal(ctx, value).await,
            }
        })
    }

    /// Returns the number of hooks left before the adapter call.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
