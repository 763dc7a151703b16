//! Application logic invoked at the deepest point of the pipeline.

use crate::context::TurnContext;
use crate::errors::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// The bot's turn handler.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Handles one turn.
    async fn on_turn(&self, ctx: &TurnContext) -> Result<()>;
}

/// A [`Bot`] backed by a closure. Build one with [`bot_fn`].
pub struct BotFn<F> {
    handler: F,
}

/// Wraps a closure as a [`Bot`].
///
/// ```rust,ignore
/// let bot = bot_fn(|ctx| Box::pin(async move {
///     ctx.send_activity("hello").await?;
///     Ok(())
/// }));
/// ```
pub fn bot_fn<F>(handler: F) -> BotFn<F>
where
    F: for<'a> Fn(&'a TurnContext) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    BotFn { handler }
}

#[async_trait]
impl<F> Bot for BotFn<F>
where
    F: for<'a> Fn(&'a TurnContext) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    async fn on_turn(&self, ctx: &TurnContext) -> Result<()> {
        (self.handler)(ctx).await
    }
}
