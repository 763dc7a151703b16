//! # Botflow
//!
//! The turn-processing core of a conversational bot.
//!
//! Every inbound activity becomes one turn. The turn flows through an ordered
//! middleware pipeline and ends at the bot's handler, with support for:
//!
//! - **Onion middleware**: handlers run before and after the rest of the chain, and may short-circuit it
//! - **Bot state**: per-user and per-conversation documents cached for the turn and written only when changed
//! - **State sets**: several scopes loaded and saved concurrently
//! - **Auto-save**: one middleware that persists every changed scope at the end of the turn
//! - **Turn services**: a keyed, turn-scoped registry disposed when the turn ends
//! - **Cancellation**: cooperative cancellation of every suspending operation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use botflow::prelude::*;
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let conversation = Arc::new(BotState::conversation(storage.clone()));
//! let turns = conversation.create_property::<u32>("turns");
//!
//! let mut adapter = MyAdapter::new();
//! adapter.middleware_mut().add_auto_save(AutoSaveStateMiddleware::new([conversation]));
//!
//! let bot = bot_fn(move |ctx| {
//!     let turns = turns.clone();
//!     Box::pin(async move {
//!         let count = turns.get(ctx).await? + 1;
//!         turns.set(ctx, &count).await?;
//!         ctx.send_activity(format!("turn {count}")).await?;
//!         Ok(())
//!     })
//! });
//!
//! process_activity(Arc::new(adapter), activity, &bot).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapter;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod middleware;
pub mod observability;
pub mod state;
pub mod storage;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{
        continue_conversation, process_activity, process_activity_with_cancellation,
        run_pipeline, BotAdapter,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{BotflowConfig, LoggingConfig, StateConfig};
    pub use crate::context::{
        Activity, ConversationReference, DeleteNext, Dispose, ResourceResponse, SendNext,
        TurnContext, TurnServiceRegistry, UpdateNext,
    };
    pub use crate::errors::{
        BotflowError, ConcurrencyConflictError, ErrorKind, KeyAlreadyRegisteredError, Result,
    };
    pub use crate::middleware::{bot_fn, from_fn, Bot, Middleware, MiddlewareSet, Next};
    pub use crate::observability::init_tracing;
    pub use crate::state::{
        AutoSaveStateMiddleware, BotState, BotStateSet, StatePropertyAccessor, StorageKeyFactory,
    };
    pub use crate::storage::{ETags, MemoryStorage, Storage, StoreItem, StoreItems};
    pub use std::sync::Arc;
}
