//! Stream protocol message types.
//!
//! The bridge is a stream client:
//! - Server → Client: Hello, Delta
//! - Client → Server: Subscribe, Unsubscribe
//!
//! Messages are JSON over WebSocket text frames.

use serde::{Deserialize, Serialize};

use crate::model::Delta;

/// Context used for every subscription the bridge makes.
pub const SELF_CONTEXT: &str = "vessels.self";

/// `{"context": ..., "subscribe": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub context: String,
    pub subscribe: Vec<Subscription>,
}

impl SubscribeRequest {
    /// Subscribe to `patterns` on the self vessel with the instant policy.
    pub fn self_paths<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            context: SELF_CONTEXT.to_string(),
            subscribe: patterns.into_iter().map(Subscription::instant).collect(),
        }
    }
}

/// One path in a subscribe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<SubscriptionFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<SubscriptionPolicy>,
    #[serde(rename = "minPeriod", skip_serializing_if = "Option::is_none")]
    pub min_period: Option<u64>,
}

impl Subscription {
    /// Every change, as it happens.
    pub fn instant(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            period: None,
            format: Some(SubscriptionFormat::Delta),
            policy: Some(SubscriptionPolicy::Instant),
            min_period: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionFormat {
    Delta,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPolicy {
    Instant,
    Ideal,
    Fixed,
}

/// `{"context": ..., "unsubscribe": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub context: String,
    pub unsubscribe: Vec<UnsubscribePath>,
}

impl UnsubscribeRequest {
    pub fn self_paths<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            context: SELF_CONTEXT.to_string(),
            unsubscribe: patterns
                .into_iter()
                .map(|p| UnsubscribePath { path: p.into() })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribePath {
    pub path: String,
}

/// First message on every connection.
///
/// ```json
/// {
///   "name": "signalk-server",
///   "version": "1.7.0",
///   "self": "vessels.urn:mrn:signalk:uuid:c0d79334-4e25-4245-8892-54e8ccc8021d",
///   "roles": ["master", "main"],
///   "timestamp": "2024-01-17T10:30:00.000Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub version: String,

    /// Context of the self vessel; deltas carrying it are ours.
    #[serde(rename = "self")]
    pub self_urn: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Anything the server sends that the bridge understands.
///
/// Untagged: told apart by which fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Hello(HelloMessage),
    Delta(Delta),
}

/// Messages the bridge sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
}
