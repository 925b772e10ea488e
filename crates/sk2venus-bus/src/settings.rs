//! Which bus to talk to, as explicit configuration.

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// The system bus, as on a Venus OS device.
    #[default]
    System,
    /// A bus at an explicit address, e.g. `tcp:host=venus.local,port=78`.
    Address,
    /// In-process bus; nothing leaves the process.
    Memory,
}

/// Bus selection and registration retry.
///
/// ```json
/// { "kind": "address", "address": "tcp:host=192.168.1.20,port=78", "retry": { "maxAttempts": 10 } }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusSettings {
    #[serde(default)]
    pub kind: BusKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl BusSettings {
    pub fn memory() -> Self {
        Self {
            kind: BusKind::Memory,
            ..Self::default()
        }
    }
}
