//! The per-turn cancellation token.

use crate::errors::BotflowError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A hook run once when the turn is cancelled.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Signal {
    reason: Option<String>,
    callbacks: Vec<CancelCallback>,
}

/// Cooperative cancellation shared by everything running inside one turn.
///
/// Only the first reason is kept. Hooks registered after cancellation run
/// immediately.
#[derive(Default)]
pub struct CancellationToken {
    /// Fast-path flag; set only after `signal.reason` is filled in.
    cancelled: AtomicBool,
    signal: Mutex<Signal>,
    notify: Notify,
}

fn run_hook(hook: &CancelCallback) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)) {
        warn!(?panic, "Cancellation hook panicked");
    }
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the turn. Later calls are ignored.
    ///
    /// Registered hooks run on the calling thread; a panicking hook is logged
    /// and does not stop the others.
    pub fn cancel(&self, reason: impl Into<String>) {
        let hooks = {
            let mut signal = self.signal.lock();
            if signal.reason.is_some() {
                return;
            }
            let reason = reason.into();
            debug!(%reason, "Cancellation requested");
            signal.reason = Some(reason);
            self.cancelled.store(true, Ordering::SeqCst);
            std::mem::take(&mut signal.callbacks)
        };

        hooks.iter().for_each(run_hook);
        self.notify.notify_waiters();
    }

    /// Registers a hook to run on cancellation, or runs it now if already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hook: CancelCallback = Box::new(callback);
        {
            let mut signal = self.signal.lock();
            if signal.reason.is_none() {
                signal.callbacks.push(hook);
                return;
            }
        }
        run_hook(&hook);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.signal.lock().reason.clone()
    }

    /// Fails with `Cancelled` if cancellation has been requested.
    pub fn check(&self) -> Result<(), BotflowError> {
        if !self.is_cancelled() {
            return Ok(());
        }
        let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
        Err(BotflowError::cancelled(reason))
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `cancel` cannot slip between the check and the wait.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
