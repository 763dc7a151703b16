//! Observability utilities.

mod spans;

pub use spans::{init_tracing, turn_span, TurnSpanAttributes};
