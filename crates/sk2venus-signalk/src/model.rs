//! Signal K data model types.
//!
//! Only the delta side of the model is needed: the bridge never reads the
//! full tree, it follows the stream.

use serde::{Deserialize, Serialize};

/// A delta: changes to one context, grouped by source and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Vessel the values belong to; absent means the self vessel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    pub updates: Vec<Update>,
}

impl Delta {
    /// A delta about the self vessel with a single update.
    pub fn self_update(values: Vec<PathValue>) -> Self {
        Self {
            context: Some("vessels.self".to_string()),
            updates: vec![Update {
                source_ref: None,
                source: None,
                timestamp: Some(
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ),
                values,
            }],
        }
    }
}

/// Values from one source at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// `$source` reference such as "n2k.112".
    #[serde(rename = "$source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Inline source, used by older servers instead of `$source`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// RFC 3339, UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub values: Vec<PathValue>,
}

/// One changed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,

    pub value: serde_json::Value,
}

impl PathValue {
    pub fn new(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Where an inline-sourced update came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub label: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgn: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_deserialize() {
        let json = r#"{
            "context": "vessels.urn:mrn:imo:mmsi:244000000",
            "updates": [{
                "$source": "n2k.112",
                "timestamp": "2024-01-17T10:30:00.000Z",
                "values": [
                    {"path": "tanks.fuel.0.currentLevel", "value": 0.42},
                    {"path": "tanks.fuel.0.capacity", "value": 0.2}
                ]
            }]
        }"#;

        let delta: Delta = serde_json::from_str(json).unwrap();
        assert_eq!(
            delta.context.as_deref(),
            Some("vessels.urn:mrn:imo:mmsi:244000000")
        );
        assert_eq!(delta.updates[0].values.len(), 2);
        assert_eq!(delta.updates[0].values[1].path, "tanks.fuel.0.capacity");
    }

    #[test]
    fn test_update_without_values() {
        // Meta-only updates carry no values
        let json = r#"{"updates": [{"meta": [{"path": "a.b", "value": {"units": "K"}}]}]}"#;
        let delta: Delta = serde_json::from_str(json).unwrap();
        assert!(delta.updates[0].values.is_empty());
    }
}
