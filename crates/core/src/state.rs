//! Layered key/value state with read-your-writes semantics.
//!
//! Keys are partitioned by prefix: `app:` state is shared across a whole
//! app, `user:` state across one user's sessions, `temp:` state lives for a
//! single invocation and is never persisted. Unprefixed keys are
//! session-scoped.

use serde::{Deserialize, Serialize};

/// Prefix for app-scoped keys.
pub const APP_PREFIX: &str = "app:";

/// Prefix for user-scoped keys.
pub const USER_PREFIX: &str = "user:";

/// Prefix for invocation-scoped keys. Never persisted.
pub const TEMP_PREFIX: &str = "temp:";

/// A committed value map plus a pending delta map.
///
/// Reads consult the delta before the committed values, so a writer sees its
/// own uncommitted writes. The delta becomes durable only when it rides an
/// event's `state_delta` through the append path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    value: serde_json::Map<String, serde_json::Value>,
    delta: serde_json::Map<String, serde_json::Value>,
}

impl State {
    /// Create state from committed values and a pending delta.
    pub fn new(
        value: serde_json::Map<String, serde_json::Value>,
        delta: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self { value, delta }
    }

    /// Read a key, consulting the pending delta first.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.delta.get(key).or_else(|| self.value.get(key))
    }

    /// Write a key into both the committed view and the pending delta.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.value.insert(key.clone(), value.clone());
        self.delta.insert(key, value);
    }

    /// Whether the key is visible in either layer.
    pub fn contains_key(&self, key: &str) -> bool {
        self.delta.contains_key(key) || self.value.contains_key(key)
    }

    /// The pending, not-yet-committed writes.
    pub fn pending_delta(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.delta
    }

    /// Merged view with the delta overlaid on committed values.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut merged = self.value.clone();
        for (key, value) in &self.delta {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}
