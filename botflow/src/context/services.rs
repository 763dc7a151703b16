//! Turn-scoped service registry.

use crate::errors::KeyAlreadyRegisteredError;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Capability for services that hold resources which must be released at turn end.
pub trait Dispose: Send + Sync {
    /// Releases the service's turn-scoped resources.
    fn dispose(&self);
}

struct ServiceEntry {
    service: Arc<dyn Any + Send + Sync>,
    disposer: Option<Arc<dyn Dispose>>,
    disposed: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, ServiceEntry>,
    order: Vec<String>,
}

/// Per-turn keyed store of arbitrary services.
///
/// Keys are unique. Lookups are by key; insertion order only matters for
/// [`TurnServiceRegistry::dispose`].
#[derive(Default)]
pub struct TurnServiceRegistry {
    inner: RwLock<Inner>,
}

impl TurnServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under `key`.
    ///
    /// # Errors
    ///
    /// Returns `KeyAlreadyRegisteredError` if the key is taken.
    pub fn add<T>(&self, key: impl Into<String>, service: Arc<T>) -> Result<(), KeyAlreadyRegisteredError>
    where
        T: Any + Send + Sync,
    {
        self.insert(key.into(), service, None)
    }

    /// Registers a service whose [`Dispose`] hook runs when the turn ends.
    ///
    /// # Errors
    ///
    /// Returns `KeyAlreadyRegisteredError` if the key is taken.
    pub fn add_disposable<T>(
        &self,
        key: impl Into<String>,
        service: Arc<T>,
    ) -> Result<(), KeyAlreadyRegisteredError>
    where
        T: Dispose + Any,
    {
        let disposer: Arc<dyn Dispose> = service.clone();
        self.insert(key.into(), service, Some(disposer))
    }

    /// Registers a service keyed by its type name.
    pub fn add_typed<T>(&self, service: Arc<T>) -> Result<(), KeyAlreadyRegisteredError>
    where
        T: Any + Send + Sync,
    {
        self.add(std::any::type_name::<T>(), service)
    }

    fn insert(
        &self,
        key: String,
        service: Arc<dyn Any + Send + Sync>,
        disposer: Option<Arc<dyn Dispose>>,
    ) -> Result<(), KeyAlreadyRegisteredError> {
        let mut inner = self.inner.write();

        if inner.entries.contains_key(&key) {
            return Err(KeyAlreadyRegisteredError::new(key));
        }

        trace!(service_key = %key, "Registering turn service");
        inner.order.push(key.clone());
        inner.entries.insert(
            key,
            ServiceEntry {
                service,
                disposer,
                disposed: false,
            },
        );
        Ok(())
    }

    /// Returns the service stored under `key`, or `None` if missing or of another type.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let service = self.inner.read().entries.get(key)?.service.clone();
        service.downcast::<T>().ok()
    }

    /// Returns the service registered with [`TurnServiceRegistry::add_typed`].
    #[must_use]
    pub fn get_typed<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get(std::any::type_name::<T>())
    }

    /// Checks if a key is registered.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Removes a service without disposing it. Returns true if something was removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.remove(key).is_some() {
            inner.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Returns all keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Runs every pending dispose hook in registration order.
    ///
    /// Each service is disposed at most once, so calling this twice is harmless.
    /// Services without the capability are skipped. Panicking hooks are logged
    /// and do not stop the remaining hooks.
    pub fn dispose(&self) {
        let pending: Vec<(String, Arc<dyn Dispose>)> = {
            let mut inner = self.inner.write();
            let Inner { entries, order } = &mut *inner;
            order
                .iter()
                .filter_map(|key| {
                    let entry = entries.get_mut(key)?;
                    if entry.disposed {
                        return None;
                    }
                    entry.disposed = true;
                    entry.disposer.clone().map(|d| (key.clone(), d))
                })
                .collect()
        };

        for (key, disposer) in pending {
            trace!(service_key = %key, "Disposing turn service");
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                disposer.dispose();
            })) {
                warn!(service_key = %key, "Turn service dispose panicked: {:?}", e);
            }
        }
    }
}

impl std::fmt::Debug for TurnServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnServiceRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
