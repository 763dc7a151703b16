//! Cooperative cancellation for turns.
//!
//! Every suspending operation in the core receives the turn's
//! [`CancellationToken`]. Handlers and storage calls check it and fail with
//! [`crate::errors::BotflowError::Cancelled`] instead of continuing.

mod token;

pub use token::{CancelCallback, CancellationToken};
