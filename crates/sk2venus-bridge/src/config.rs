//! Bridge configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use sk2venus_core::identity::{DEFAULT_NAMESPACE, DEFAULT_SOURCE};
use sk2venus_core::{ManagementInfo, ServiceDescriptor, ServiceNaming};

use crate::error::{BridgeError, Result};

/// What to bridge and how to name it.
///
/// ```json
/// {
///   "namespace": "com.victronenergy",
///   "source": "signalk",
///   "management": { "connection": "Signal K" },
///   "services": [
///     { "class": "tank", "path": "tanks.fuel.0" },
///     { "class": "temperature", "path": "environment.inside", "instance": 1 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default)]
    pub management: ManagementInfo,

    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            source: default_source(),
            management: ManagementInfo::default(),
            services: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Validated naming scheme.
    pub fn naming(&self) -> Result<ServiceNaming> {
        Ok(ServiceNaming::new(&self.namespace, &self.source)?)
    }

    /// Check the configuration as a whole before anything is registered.
    ///
    /// Individual descriptors are validated again at activation so that one
    /// bad service does not keep the others from starting; this only rejects
    /// what makes the whole configuration meaningless.
    pub fn validate(&self) -> Result<()> {
        self.naming()?;
        let mut paths = HashSet::new();
        for descriptor in &self.services {
            if !paths.insert((descriptor.class, descriptor.path.as_str())) {
                return Err(BridgeError::Config(format!(
                    "{} {} is configured twice",
                    descriptor.class, descriptor.path
                )));
            }
        }
        Ok(())
    }
}
