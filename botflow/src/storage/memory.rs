//! In-memory storage.

use super::{ETags, Storage, StoreItem, StoreItems};
use crate::cancellation::CancellationToken;
use crate::errors::{ConcurrencyConflictError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Process-local [`Storage`] for tests and single-instance bots.
///
/// Every successful write stamps the item with a fresh, monotonically
/// increasing ETag.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, StoreItem>,
    next_e_tag: AtomicU64,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored item, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoreItem> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn stamp(&self, mut item: StoreItem) -> (StoreItem, String) {
        let tag = (self.next_e_tag.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        item.e_tag = Some(tag.clone());
        (item, tag)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, keys: &[String], cancel: &CancellationToken) -> Result<StoreItems> {
        cancel.check()?;

        Ok(keys
            .iter()
            .filter_map(|key| self.get(key).map(|item| (key.clone(), item)))
            .collect())
    }

    async fn write(&self, changes: StoreItems, cancel: &CancellationToken) -> Result<ETags> {
        cancel.check()?;

        let mut tags = ETags::with_capacity(changes.len());
        for (key, item) in changes {
            trace!(storage_key = %key, "Writing item");
            match self.entries.entry(key) {
                Entry::Occupied(mut occupied) => {
                    if item.requires_match() && occupied.get().e_tag != item.e_tag {
                        return Err(ConcurrencyConflictError::new(
                            occupied.key().clone(),
                            item.e_tag,
                            occupied.get().e_tag.clone(),
                        )
                        .into());
                    }
                    let (item, tag) = self.stamp(item);
                    tags.insert(occupied.key().clone(), tag);
                    occupied.insert(item);
                }
                Entry::Vacant(vacant) => {
                    let (item, tag) = self.stamp(item);
                    tags.insert(vacant.key().clone(), tag);
                    vacant.insert(item);
                }
            }
        }

        Ok(tags)
    }

    async fn delete(&self, keys: &[String], cancel: &CancellationToken) -> Result<()> {
        cancel.check()?;

        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}
