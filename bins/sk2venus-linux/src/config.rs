//! Application configuration file.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use sk2venus_bridge::BridgeConfig;
use sk2venus_bus::BusSettings;
use sk2venus_signalk::ClientConfig;

/// Everything `sk2venus` reads from its JSON config file.
///
/// ```json
/// {
///   "source": "signalk",
///   "services": [{ "class": "tank", "path": "tanks.fuel.0" }],
///   "bus": { "kind": "system" },
///   "signalk": { "url": "ws://localhost:3000" },
///   "http": { "bind": "127.0.0.1:3002" }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(flatten)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub bus: BusSettings,

    #[serde(default)]
    pub signalk: ClientConfig,

    /// Status API; disabled when absent.
    #[serde(default)]
    pub http: Option<HttpConfig>,

    /// Pending Signal K values held before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

fn default_queue_capacity() -> usize {
    256
}

impl AppConfig {
    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self {
                queue_capacity: default_queue_capacity(),
                ..Self::default()
            });
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if config.queue_capacity == 0 {
            anyhow::bail!("queueCapacity must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sk2venus_bus::BusKind;
    use sk2venus_core::DeviceClass;

    #[test]
    fn test_full_config() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "source": "skbridge",
                "management": { "connection": "Signal K server" },
                "services": [
                    { "class": "tank", "path": "tanks.fuel.0", "name": "Port" },
                    { "class": "temperature", "path": "environment.inside", "instance": 2 }
                ],
                "bus": { "kind": "address", "address": "tcp:host=venus.local,port=78" },
                "signalk": { "url": "ws://boat.local:3000", "reconnectSecs": 10 },
                "http": { "bind": "127.0.0.1:3002" },
                "queueCapacity": 32
            }"#,
        )
        .unwrap();

        assert_eq!(config.bridge.source, "skbridge");
        assert_eq!(config.bridge.namespace, "com.victronenergy");
        assert_eq!(config.bridge.management.connection, "Signal K server");
        assert_eq!(config.bridge.services.len(), 2);
        assert_eq!(config.bridge.services[1].class, DeviceClass::Temperature);
        assert_eq!(config.bus.kind, BusKind::Address);
        assert_eq!(config.signalk.reconnect_secs, 10);
        assert_eq!(
            config.http.unwrap().bind,
            "127.0.0.1:3002".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.queue_capacity, 32);
    }

    #[test]
    fn test_minimal_config() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bus.kind, BusKind::System);
        assert_eq!(config.signalk.url, "ws://localhost:3000");
        assert!(config.http.is_none());
        assert_eq!(config.queue_capacity, 256);
        assert!(config.bridge.services.is_empty());
    }

    #[test]
    fn test_no_path_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.bridge.source, "signalk");
    }
}
