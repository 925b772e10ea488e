//! Service descriptors and management metadata.
//!
//! These are the configuration types shared by every front end. A descriptor
//! names the device class and the Signal K path it reads from; resolving it
//! yields the service identity and a ready-to-register adapter.

use serde::{Deserialize, Serialize};

use crate::adapter::DeviceAdapter;
use crate::error::{Error, Result};
use crate::identity::{DeviceClass, ServiceIdentity};

/// Management values published under `/Mgmt` and the product properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagementInfo {
    pub process_name: String,
    pub process_version: String,
    pub connection: String,
    pub product_id: String,
    pub product_name: String,
    pub firmware_version: String,
    pub hardware_version: String,
}

impl Default for ManagementInfo {
    fn default() -> Self {
        Self {
            process_name: "sk2venus".to_string(),
            process_version: env!("CARGO_PKG_VERSION").to_string(),
            connection: "Signal K".to_string(),
            product_id: "sk2venus".to_string(),
            product_name: "Signal K bridge".to_string(),
            firmware_version: "n/a".to_string(),
            hardware_version: "n/a".to_string(),
        }
    }
}

/// Scale factors for tank services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankFactors {
    /// Multiplier applied to `capacity`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,

    /// Multiplier applied to `currentLevel` before rounding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
}

/// Default level factor: fraction to percent.
pub const DEFAULT_LEVEL_FACTOR: f64 = 100.0;

/// One configured service.
///
/// ```json
/// { "class": "tank", "path": "tanks.fuel.0", "name": "Port fuel", "factors": { "capacity": 1.0 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Device class.
    pub class: DeviceClass,

    /// Signal K base path the service reads from (e.g. "tanks.fuel.0").
    pub path: String,

    /// Display name, published as `/CustomName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Device instance for classes whose path carries none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<u32>,

    /// Single scale factor (GPS).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,

    /// Tank scale factors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factors: Option<TankFactors>,
}

impl ServiceDescriptor {
    /// Resolve the service identity from the class and path.
    pub fn identity(&self) -> Result<ServiceIdentity> {
        if self.path.is_empty() || self.path.split('.').any(str::is_empty) {
            return Err(Error::InvalidServicePath {
                class: self.class.to_string(),
                path: self.path.clone(),
            });
        }
        let instance = self.instance.unwrap_or(0);
        match self.class {
            DeviceClass::Tank => {
                let mut identity = ServiceIdentity::from_tank_path(&self.path)?;
                if let Some(instance) = self.instance {
                    identity.instance = instance;
                }
                Ok(identity)
            }
            DeviceClass::Temperature => Ok(ServiceIdentity::temperature(instance)),
            DeviceClass::Gps => Ok(ServiceIdentity::gps(instance)),
        }
    }

    /// Build the adapter for this descriptor.
    pub fn build_adapter(&self, management: &ManagementInfo) -> Result<DeviceAdapter> {
        let identity = self.identity()?;
        let name = self.name.as_deref();
        let adapter = match self.class {
            DeviceClass::Tank => {
                let factors = self.factors.unwrap_or_default();
                DeviceAdapter::tank(
                    identity,
                    management,
                    name,
                    factors.capacity.unwrap_or(1.0),
                    factors.level.unwrap_or(DEFAULT_LEVEL_FACTOR),
                )
            }
            DeviceClass::Temperature => DeviceAdapter::temperature(identity, management, name),
            DeviceClass::Gps => {
                DeviceAdapter::gps(identity, management, name, self.factor.unwrap_or(1.0))
            }
        };
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FluidType;
    use crate::tree::PropertyTree;
    use crate::value::BusValue;
    use serde_json::json;

    #[test]
    fn test_descriptor_deserialize() {
        let json = r#"{
            "class": "tank",
            "path": "tanks.freshWater.1",
            "name": "Bow tank",
            "factors": { "capacity": 0.001 }
        }"#;

        let descriptor: ServiceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.class, DeviceClass::Tank);
        assert_eq!(descriptor.factors.unwrap().capacity, Some(0.001));
        assert_eq!(descriptor.factors.unwrap().level, None);

        let identity = descriptor.identity().unwrap();
        assert_eq!(identity, ServiceIdentity::tank(FluidType::FreshWater, 1));
    }

    #[test]
    fn test_build_tank_adapter() {
        let descriptor = ServiceDescriptor {
            class: DeviceClass::Tank,
            path: "tanks.fuel.2".to_string(),
            name: Some("Starboard".to_string()),
            instance: None,
            factor: None,
            factors: None,
        };

        let mut adapter = descriptor.build_adapter(&ManagementInfo::default()).unwrap();
        let tree = PropertyTree::from_schema(adapter.schema()).unwrap();
        assert_eq!(tree.get("/CustomName").unwrap(), &BusValue::from("Starboard"));
        assert_eq!(tree.get("/DeviceInstance").unwrap(), &BusValue::Int32(2));

        let writes = adapter.apply("currentLevel", &json!(0.42)).unwrap();
        assert_eq!(writes[0].value, BusValue::Float(42.0));
    }

    #[test]
    fn test_instance_override() {
        let descriptor: ServiceDescriptor = serde_json::from_value(json!({
            "class": "tank", "path": "tanks.fuel.0", "instance": 20
        }))
        .unwrap();
        assert_eq!(descriptor.identity().unwrap().instance, 20);

        let descriptor: ServiceDescriptor = serde_json::from_value(json!({
            "class": "temperature", "path": "environment.inside", "instance": 3
        }))
        .unwrap();
        assert_eq!(descriptor.identity().unwrap(), ServiceIdentity::temperature(3));
    }

    #[test]
    fn test_invalid_paths() {
        for (class, path) in [
            (DeviceClass::Tank, "tanks.fuel"),
            (DeviceClass::Temperature, ""),
            (DeviceClass::Gps, "navigation..x"),
        ] {
            let descriptor = ServiceDescriptor {
                class,
                path: path.to_string(),
                name: None,
                instance: None,
                factor: None,
                factors: None,
            };
            assert!(matches!(
                descriptor.identity(),
                Err(Error::InvalidServicePath { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_class_rejected() {
        let result: std::result::Result<ServiceDescriptor, _> =
            serde_json::from_value(json!({"class": "battery", "path": "electrical.batteries.0"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_management_defaults() {
        let info: ManagementInfo = serde_json::from_str(r#"{"connection": "N2K"}"#).unwrap();
        assert_eq!(info.connection, "N2K");
        assert_eq!(info.process_name, "sk2venus");
        assert_eq!(info.firmware_version, "n/a");
    }
}
