//! Per-turn cache entries and content fingerprints.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Computes a deterministic fingerprint of a state document.
///
/// Object keys are hashed in sorted order at every depth, so equal documents
/// hash equally regardless of insertion order. Scalars are hashed in their JSON
/// encoding, so `"1"` and `1` differ.
#[must_use]
pub fn compute_hash(state: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    feed_object(&mut hasher, state);
    hex::encode(hasher.finalize())
}

fn feed_object(hasher: &mut Sha256, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    hasher.update(b"{");
    for (key, value) in entries {
        hasher.update(Value::from(key.as_str()).to_string().as_bytes());
        hasher.update(b":");
        feed_value(hasher, value);
        hasher.update(b",");
    }
    hasher.update(b"}");
}

fn feed_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Object(map) => feed_object(hasher, map),
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                feed_value(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}

#[derive(Debug, Default)]
struct CachedInner {
    state: Map<String, Value>,
    hash: String,
    e_tag: Option<String>,
}

/// A scope's in-memory document for one turn, plus the fingerprint taken at
/// the last load or save.
///
/// The entry is dirty iff a fresh hash of the document differs from that fingerprint.
#[derive(Debug)]
pub struct CachedBotState {
    inner: Mutex<CachedInner>,
}

impl Default for CachedBotState {
    fn default() -> Self {
        Self::new(Map::new(), None)
    }
}

impl CachedBotState {
    /// Seeds an entry from a loaded document.
    #[must_use]
    pub fn new(state: Map<String, Value>, e_tag: Option<String>) -> Self {
        let hash = compute_hash(&state);
        Self {
            inner: Mutex::new(CachedInner { state, hash, e_tag }),
        }
    }

    /// Returns true if the document changed since the last load or save.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        let inner = self.inner.lock();
        compute_hash(&inner.state) != inner.hash
    }

    /// Returns the fingerprint taken at the last load or save.
    #[must_use]
    pub fn hash(&self) -> String {
        self.inner.lock().hash.clone()
    }

    /// Returns the ETag observed at load.
    #[must_use]
    pub fn e_tag(&self) -> Option<String> {
        self.inner.lock().e_tag.clone()
    }

    /// Returns a copy of the document.
    #[must_use]
    pub fn state(&self) -> Map<String, Value> {
        self.inner.lock().state.clone()
    }

    /// Returns a property value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.lock().state.get(name).cloned()
    }

    /// Sets a property value.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner.lock().state.insert(name.into(), value);
    }

    /// Removes a property, returning its value.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.inner.lock().state.remove(name)
    }

    /// Empties the document and invalidates the fingerprint, so the next save writes.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.state = Map::new();
        inner.hash = String::new();
    }

    /// Replaces the document with a freshly loaded one.
    pub(crate) fn reset(&self, state: Map<String, Value>, e_tag: Option<String>) {
        let mut inner = self.inner.lock();
        inner.hash = compute_hash(&state);
        inner.state = state;
        inner.e_tag = e_tag;
    }

    /// Returns the document and its current hash, for writing.
    pub(crate) fn snapshot(&self) -> (Map<String, Value>, String) {
        let inner = self.inner.lock();
        (inner.state.clone(), compute_hash(&inner.state))
    }

    /// Records that the document with `hash` is now what storage holds,
    /// under the token the write stamped on it.
    pub(crate) fn mark_saved(&self, hash: String, e_tag: Option<String>) {
        let mut inner = self.inner.lock();
        inner.hash = hash;
        inner.e_tag = e_tag;
    }
}
