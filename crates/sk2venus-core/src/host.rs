//! Host collaborators.
//!
//! The bridge never talks to Signal K directly; it sees a push stream of
//! values, a point-in-time lookup, and a place to report status. Front ends
//! implement these traits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single value pushed by the event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    /// Full Signal K path, e.g. "tanks.fuel.0.currentLevel".
    pub path: String,
    pub value: Value,
}

impl SourceEvent {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Handle returned by [`EventSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Push subscription to self-vessel paths.
pub trait EventSource: Send + Sync {
    /// Start forwarding values for `path` into the event queue.
    fn subscribe(&self, path: &str) -> SubscriptionId;

    /// Stop forwarding. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Point-in-time lookup of the latest self-vessel value.
pub trait ValueSource: Send + Sync {
    fn get_self_path(&self, path: &str) -> Option<Value>;
}

/// Status and error reporting.
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str);
    fn error(&self, message: &str);
}

/// Join a service base path and a key: `("tanks.fuel.0", "capacity")`.
pub fn join_path(base: &str, key: &str) -> String {
    format!("{}.{}", base, key)
}

/// Split a full path into its parent and final key.
pub fn split_key(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_split() {
        let full = join_path("tanks.fuel.0", "currentLevel");
        assert_eq!(full, "tanks.fuel.0.currentLevel");
        assert_eq!(split_key(&full), Some(("tanks.fuel.0", "currentLevel")));
        assert_eq!(split_key("navigation"), None);
    }
}
