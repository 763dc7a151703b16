//! Testing utilities for bots built on botflow.
//!
//! This module provides:
//! - An in-process adapter that records replies
//! - Recording and failing middleware, bots, and storage
//! - Assertions for call logs and error kinds

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_call_order, assert_error_kind};
pub use fixtures::{test_activity, TestAdapter, TEST_CHANNEL, TEST_CONVERSATION, TEST_USER};
pub use mocks::{
    CallLog, FailingMiddleware, RecordingBot, RecordingMiddleware, RecordingStorage,
    ShortCircuitMiddleware,
};
