//! Test assertions for pipeline runs.

use super::CallLog;
use crate::errors::{BotflowError, ErrorKind, Result};

/// Asserts that the log recorded exactly the expected entries, in order.
pub fn assert_call_order(log: &CallLog, expected: &[&str]) {
    let actual = log.entries();
    assert_eq!(
        actual, expected,
        "Expected call order {expected:?}, got {actual:?}"
    );
}

/// Asserts that the result failed with the expected kind and returns the error.
pub fn assert_error_kind<T: std::fmt::Debug>(result: Result<T>, expected: ErrorKind) -> BotflowError {
    match result {
        Ok(value) => panic!("Expected {expected:?} error, got Ok({value:?})"),
        Err(err) => {
            assert_eq!(
                err.kind(),
                expected,
                "Expected {expected:?} error, got: {err}"
            );
            err
        }
    }
}
