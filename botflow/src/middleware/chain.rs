//! Middleware chain for ordered turn processing.

use super::Bot;
use crate::context::TurnContext;
use crate::errors::Result;
use crate::state::AutoSaveStateMiddleware;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, trace};

/// Trait for turn middleware.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Returns a name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles the turn.
    ///
    /// Code before `next.run()` runs on the way in, code after it on the way
    /// out. Returning without calling `next.run()` short-circuits the rest of
    /// the chain.
    async fn on_turn(&self, ctx: &TurnContext, next: Next<'_>) -> Result<()>;
}

/// What runs once every handler of a chain has called `next`.
enum Tail<'a> {
    Done,
    Bot(&'a dyn Bot),
    Outer(Box<Next<'a>>),
}

/// The continuation handed to each middleware: the remainder of the chain.
#[must_use = "the rest of the pipeline only runs if `run` is awaited"]
pub struct Next<'a> {
    ctx: &'a TurnContext,
    remaining: &'a [Arc<dyn Middleware>],
    tail: Tail<'a>,
}

impl<'a> Next<'a> {
    /// Runs the rest of the chain, ending with the bot if one was supplied.
    ///
    /// Fails with `Cancelled` before entering the next link if the turn was cancelled.
    pub fn run(self) -> BoxFuture<'a, Result<()>> {
        let Next {
            ctx,
            remaining,
            tail,
        } = self;

        Box::pin(async move {
            ctx.check_cancelled()?;

            match remaining.split_first() {
                Some((head, rest)) => {
                    trace!(middleware = head.name(), "Entering middleware");
                    let next = Next {
                        ctx,
                        remaining: rest,
                        tail,
                    };
                    head.on_turn(ctx, next).await
                }
                None => match tail {
                    Tail::Done => Ok(()),
                    Tail::Bot(bot) => bot.on_turn(ctx).await,
                    Tail::Outer(outer) => outer.run().await,
                },
            }
        })
    }

    /// Returns the number of handlers left in this chain (not counting enclosing sets).
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

/// An ordered list of middleware.
#[derive(Clone, Default)]
pub struct MiddlewareSet {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    pub fn add(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Appends a handler, builder style.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.add(middleware);
        self
    }

    /// Inserts a handler ahead of every registered handler.
    pub fn add_first(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.insert(0, middleware);
        self
    }

    /// Registers automatic state saving as the outermost handler, so its save
    /// runs after the bot and after every other handler has unwound.
    pub fn add_auto_save(&mut self, auto_save: AutoSaveStateMiddleware) -> &mut Self {
        self.add_first(Arc::new(auto_save))
    }

    /// Returns the number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs the chain for one turn, with the bot at the deepest point.
    ///
    /// Handler failures propagate to the caller unchanged.
    pub async fn run(&self, ctx: &TurnContext, bot: Option<&dyn Bot>) -> Result<()> {
        debug!(
            handlers = self.middleware.len(),
            has_bot = bot.is_some(),
            "Running middleware pipeline"
        );

        let tail = match bot {
            Some(bot) => Tail::Bot(bot),
            None => Tail::Done,
        };

        Next {
            ctx,
            remaining: &self.middleware,
            tail,
        }
        .run()
        .await
    }
}

#[async_trait]
impl Middleware for MiddlewareSet {
    async fn on_turn(&self, ctx: &TurnContext, next: Next<'_>) -> Result<()> {
        Next {
            ctx,
            remaining: &self.middleware,
            tail: Tail::Outer(Box::new(next)),
        }
        .run()
        .await
    }
}

impl std::fmt::Debug for MiddlewareSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.middleware.iter().map(|m| m.name()))
            .finish()
    }
}

/// Middleware backed by a closure. Build one with [`from_fn`].
pub struct MiddlewareFn<F> {
    handler: F,
}

/// Wraps a closure as [`Middleware`].
///
/// ```rust,ignore
/// let timing = from_fn(|ctx, next| Box::pin(async move {
///     let started = std::time::Instant::now();
///     let result = next.run().await;
///     tracing::info!(elapsed = ?started.elapsed(), "turn done");
///     result
/// }));
/// ```
pub fn from_fn<F>(handler: F) -> MiddlewareFn<F>
where
    F: for<'a> Fn(&'a TurnContext, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    MiddlewareFn { handler }
}

#[async_trait]
impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a TurnContext, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    async fn on_turn(&self, ctx: &TurnContext, next: Next<'_>) -> Result<()> {
        (self.handler)(ctx, next).await
    }
}
