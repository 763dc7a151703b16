//! The storage port consumed by bot state.
//!
//! Values are opaque JSON objects. Each item may carry an ETag; a write whose
//! ETag no longer matches the stored item fails with `ConcurrencyConflict`,
//! while `"*"` (or no ETag) writes unconditionally.

mod memory;

pub use memory::MemoryStorage;

use crate::cancellation::CancellationToken;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ETag that disables the concurrency check for a write.
pub const WILDCARD_ETAG: &str = "*";

/// A stored value and its concurrency token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreItem {
    /// The stored document.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Optimistic-concurrency token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

impl StoreItem {
    /// Creates an item without a token.
    #[must_use]
    pub fn new(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { data, e_tag: None }
    }

    /// Sets the token.
    #[must_use]
    pub fn with_e_tag(mut self, e_tag: impl Into<String>) -> Self {
        self.e_tag = Some(e_tag.into());
        self
    }

    /// Returns true if a write of this item must match the stored token.
    #[must_use]
    pub fn requires_match(&self) -> bool {
        matches!(self.e_tag.as_deref(), Some(tag) if tag != WILDCARD_ETAG)
    }
}

/// Items keyed by storage key.
pub type StoreItems = HashMap<String, StoreItem>;

/// The token a write stamped on each item, keyed by storage key.
pub type ETags = HashMap<String, String>;

/// Key-value storage with optimistic concurrency.
///
/// Implementations own their locking and retry policy; the core never retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads the given keys. Missing keys are absent from the result.
    async fn read(&self, keys: &[String], cancel: &CancellationToken) -> Result<StoreItems>;

    /// Writes every change and returns the token now stored for each item.
    ///
    /// Backends without tokens may return an empty map; the next write of
    /// such an item is then unconditional.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` if an item's token does not match the stored one.
    async fn write(&self, changes: StoreItems, cancel: &CancellationToken) -> Result<ETags>;

    /// Deletes the given keys. Deleting a missing key is not an error.
    async fn delete(&self, keys: &[String], cancel: &CancellationToken) -> Result<()>;
}
