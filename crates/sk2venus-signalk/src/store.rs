//! Latest self-vessel values.
//!
//! The store keeps the latest value per self path. Deltas about other
//! vessels are ignored.

use std::collections::HashMap;

use serde_json::Value;

use crate::model::{Delta, PathValue};

#[derive(Debug, Clone, Default)]
pub struct SelfStore {
    /// "vessels.<urn>" once the server said hello.
    self_context: Option<String>,
    values: HashMap<String, Value>,
}

impl SelfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the self identifier from the server's hello.
    ///
    /// Accepts both "vessels.urn:..." and a bare "urn:...".
    pub fn set_self_urn(&mut self, urn: &str) {
        let context = if urn.starts_with("vessels.") {
            urn.to_string()
        } else {
            format!("vessels.{}", urn)
        };
        self.self_context = Some(context);
    }

    pub fn self_context(&self) -> Option<&str> {
        self.self_context.as_deref()
    }

    /// Whether a delta context refers to the self vessel.
    pub fn is_self(&self, context: Option<&str>) -> bool {
        match context {
            None | Some("vessels.self") => true,
            Some(context) => self.self_context.as_deref() == Some(context),
        }
    }

    /// Apply a delta. Returns the self values it carried, in delta order.
    pub fn apply_delta(&mut self, delta: &Delta) -> Vec<PathValue> {
        if !self.is_self(delta.context.as_deref()) {
            return Vec::new();
        }

        let mut applied = Vec::new();
        for pv in delta.updates.iter().flat_map(|u| &u.values) {
            self.values.insert(pv.path.clone(), pv.value.clone());
            applied.push(pv.clone());
        }
        applied
    }

    /// Latest value at a self path (e.g., "tanks.fuel.0.capacity").
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Number of distinct paths with a value.
    pub fn path_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Update;
    use serde_json::json;

    fn delta(context: Option<&str>, source: &str, values: Vec<PathValue>) -> Delta {
        Delta {
            context: context.map(str::to_string),
            updates: vec![Update {
                source_ref: Some(source.to_string()),
                source: None,
                timestamp: Some("2024-01-17T10:30:00.000Z".to_string()),
                values,
            }],
        }
    }

    #[test]
    fn test_apply_self_delta() {
        let mut store = SelfStore::new();
        let applied = store.apply_delta(&delta(
            Some("vessels.self"),
            "n2k.112",
            vec![PathValue::new("tanks.fuel.0.capacity", json!(0.2))],
        ));

        assert_eq!(applied.len(), 1);
        assert_eq!(store.get("tanks.fuel.0.capacity"), Some(&json!(0.2)));
    }

    #[test]
    fn test_missing_context_is_self() {
        let mut store = SelfStore::new();
        store.apply_delta(&delta(
            None,
            "a",
            vec![PathValue::new("navigation.position", json!({"latitude": 1.0, "longitude": 2.0}))],
        ));
        assert!(store.get("navigation.position").is_some());
    }

    #[test]
    fn test_self_urn_context() {
        let mut store = SelfStore::new();
        store.set_self_urn("urn:mrn:signalk:uuid:test-vessel");
        assert_eq!(
            store.self_context(),
            Some("vessels.urn:mrn:signalk:uuid:test-vessel")
        );

        let applied = store.apply_delta(&delta(
            Some("vessels.urn:mrn:signalk:uuid:test-vessel"),
            "a",
            vec![PathValue::new("environment.inside.temperature", json!(293.15))],
        ));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn test_other_vessels_ignored() {
        let mut store = SelfStore::new();
        store.set_self_urn("vessels.urn:mrn:signalk:uuid:test-vessel");
        let applied = store.apply_delta(&delta(
            Some("vessels.urn:mrn:imo:mmsi:244000000"),
            "ais",
            vec![PathValue::new("navigation.position", json!({"latitude": 1.0, "longitude": 2.0}))],
        ));
        assert!(applied.is_empty());
        assert_eq!(store.path_count(), 0);
    }

    #[test]
    fn test_latest_value_wins() {
        let mut store = SelfStore::new();
        for level in [0.1, 0.5, 0.9] {
            store.apply_delta(&delta(
                None,
                "a",
                vec![PathValue::new("tanks.fuel.0.currentLevel", json!(level))],
            ));
        }
        assert_eq!(store.get("tanks.fuel.0.currentLevel"), Some(&json!(0.9)));
        assert_eq!(store.path_count(), 1);
    }
}
