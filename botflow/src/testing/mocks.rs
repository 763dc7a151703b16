//! Recording and failing doubles for middleware, bots, and storage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Barrier;

use crate::cancellation::CancellationToken;
use crate::context::TurnContext;
use crate::errors::{BotflowError, Result};
use crate::middleware::{Bot, Middleware, Next};
use crate::storage::{ETags, MemoryStorage, Storage, StoreItem, StoreItems};

/// A shared, ordered log of calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A middleware that logs `pre:{label}` and `post:{label}` around the rest of the chain.
#[derive(Debug)]
pub struct RecordingMiddleware {
    label: String,
    log: CallLog,
    yield_before_next: bool,
}

impl RecordingMiddleware {
    /// Creates a recording middleware.
    #[must_use]
    pub fn new(label: impl Into<String>, log: &CallLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            yield_before_next: false,
        }
    }

    /// Suspends once before calling `next`.
    #[must_use]
    pub fn yielding(mut self) -> Self {
        self.yield_before_next = true;
        self
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    async fn on_turn(&self, _ctx: &TurnContext, next: Next<'_>) -> Result<()> {
        self.log.push(format!("pre:{}", self.label));
        if self.yield_before_next {
            tokio::task::yield_now().await;
        }
        let result = next.run().await;
        self.log.push(format!("post:{}", self.label));
        result
    }
}

/// A middleware that logs `pre:{label}` and never calls `next`.
#[derive(Debug)]
pub struct ShortCircuitMiddleware {
    label: String,
    log: CallLog,
}

impl ShortCircuitMiddleware {
    /// Creates a short-circuiting middleware.
    #[must_use]
    pub fn new(label: impl Into<String>, log: &CallLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Middleware for ShortCircuitMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    async fn on_turn(&self, _ctx: &TurnContext, _next: Next<'_>) -> Result<()> {
        self.log.push(format!("pre:{}", self.label));
        Ok(())
    }
}

/// A middleware that fails on the way in.
#[derive(Debug)]
pub struct FailingMiddleware {
    label: String,
    log: CallLog,
}

impl FailingMiddleware {
    /// Creates a failing middleware.
    #[must_use]
    pub fn new(label: impl Into<String>, log: &CallLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Middleware for FailingMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    async fn on_turn(&self, _ctx: &TurnContext, _next: Next<'_>) -> Result<()> {
        self.log.push(format!("fail:{}", self.label));
        Err(anyhow::anyhow!("{} failed", self.label).into())
    }
}

/// A bot that logs `bot` and optionally replies or fails.
#[derive(Debug, Default)]
pub struct RecordingBot {
    log: CallLog,
    reply: Option<String>,
    error: Option<String>,
}

impl RecordingBot {
    /// Creates a bot that only logs.
    #[must_use]
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    /// Replies with `text` on every turn.
    #[must_use]
    pub fn replying(mut self, text: impl Into<String>) -> Self {
        self.reply = Some(text.into());
        self
    }

    /// Fails every turn with `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

#[async_trait]
impl Bot for RecordingBot {
    async fn on_turn(&self, ctx: &TurnContext) -> Result<()> {
        self.log.push("bot");
        if let Some(message) = &self.error {
            return Err(anyhow::anyhow!("{message}").into());
        }
        if let Some(text) = &self.reply {
            ctx.send_activity(text.clone()).await?;
        }
        Ok(())
    }
}

/// A [`MemoryStorage`] that counts calls and can be made to fail, stall, or rendezvous.
#[derive(Debug, Default)]
pub struct RecordingStorage {
    inner: MemoryStorage,
    reads: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    stall_reads: AtomicBool,
    barrier: Option<Arc<Barrier>>,
}

impl RecordingStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read and write wait at `barrier` before touching the store.
    #[must_use]
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Makes subsequent reads fail with `StorageUnavailable`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent writes fail with `StorageUnavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent reads wait until the turn is cancelled.
    pub fn stall_reads(&self, stall: bool) {
        self.stall_reads.store(stall, Ordering::SeqCst);
    }

    /// Returns the number of read calls.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns the number of write calls that reached the store.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of delete calls.
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Returns a copy of the stored item, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoreItem> {
        self.inner.get(key)
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    async fn rendezvous(&self) {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn read(&self, keys: &[String], cancel: &CancellationToken) -> Result<StoreItems> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.stall_reads.load(Ordering::SeqCst) {
            cancel.cancelled().await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BotflowError::storage_unavailable("read failed"));
        }
        self.rendezvous().await;
        self.inner.read(keys, cancel).await
    }

    async fn write(&self, changes: StoreItems, cancel: &CancellationToken) -> Result<ETags> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BotflowError::storage_unavailable("write failed"));
        }
        self.rendezvous().await;
        let tags = self.inner.write(changes, cancel).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(tags)
    }

    async fn delete(&self, keys: &[String], cancel: &CancellationToken) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(keys, cancel).await
    }
}
