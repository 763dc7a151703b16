//! Middleware pipeline for turn processing.
//!
//! Handlers wrap the turn in registration order ("onion" semantics): code
//! before `next.run()` executes front to back, code after it executes back to
//! front, and a handler that never calls `next` short-circuits everything
//! registered after it, including the bot.

mod bot;
mod chain;

pub use bot::{bot_fn, Bot, BotFn};
pub use chain::{from_fn, Middleware, MiddlewareFn, MiddlewareSet, Next};
