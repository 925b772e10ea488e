//! Service identity and bus name derivation.
//!
//! Every bridged device becomes one bus service named
//! `<namespace>.<class>.<source>_<fluidType>_<instance>` (tanks) or
//! `<namespace>.<class>.<source>_<instance>` (other classes). The object path
//! is the same string with `.` replaced by `/`.
//!
//! Instance and fluid type only ever contribute decimal digits, and the
//! namespace and source are validated once, so every derived name is also a
//! valid object path.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Default service namespace used by Venus OS.
pub const DEFAULT_NAMESPACE: &str = "com.victronenergy";

/// Default source tag embedded in service names.
pub const DEFAULT_SOURCE: &str = "signalk";

fn element_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

fn tank_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^tanks\.([A-Za-z]+)\.([0-9]+)$").expect("static regex"))
}

/// Kind of sensor bridged onto the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Tank,
    Temperature,
    Gps,
}

impl DeviceClass {
    /// Class segment used in service names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Tank => "tank",
            DeviceClass::Temperature => "temperature",
            DeviceClass::Gps => "gps",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venus OS fluid type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluidType {
    Fuel,
    FreshWater,
    GreyWater,
    LiveWell,
    Lubrication,
    WasteWater,
    Gasoline,
    Error,
    Unavailable,
}

impl FluidType {
    /// Numeric code published on `/FluidType`.
    pub fn code(&self) -> i32 {
        match self {
            FluidType::Fuel => 0,
            FluidType::FreshWater => 1,
            FluidType::GreyWater => 2,
            FluidType::LiveWell => 3,
            FluidType::Lubrication => 4,
            FluidType::WasteWater => 5,
            FluidType::Gasoline => 6,
            FluidType::Error => 14,
            FluidType::Unavailable => 15,
        }
    }

    /// Look up a fluid type by its Signal K name (e.g. "freshWater").
    pub fn from_signalk(name: &str) -> Option<Self> {
        match name {
            "fuel" => Some(FluidType::Fuel),
            "freshWater" => Some(FluidType::FreshWater),
            "greyWater" => Some(FluidType::GreyWater),
            "liveWell" => Some(FluidType::LiveWell),
            "lubrication" => Some(FluidType::Lubrication),
            "wasteWater" => Some(FluidType::WasteWater),
            "gasoline" => Some(FluidType::Gasoline),
            "error" => Some(FluidType::Error),
            "unavailable" => Some(FluidType::Unavailable),
            _ => None,
        }
    }
}

/// Identity of one bridged device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    pub class: DeviceClass,
    pub instance: u32,
    /// Only set for tanks.
    pub fluid: Option<FluidType>,
}

impl ServiceIdentity {
    pub fn tank(fluid: FluidType, instance: u32) -> Self {
        Self {
            class: DeviceClass::Tank,
            instance,
            fluid: Some(fluid),
        }
    }

    pub fn temperature(instance: u32) -> Self {
        Self {
            class: DeviceClass::Temperature,
            instance,
            fluid: None,
        }
    }

    pub fn gps(instance: u32) -> Self {
        Self {
            class: DeviceClass::Gps,
            instance,
            fluid: None,
        }
    }

    /// Parse a Signal K tank path such as `tanks.fuel.0`.
    ///
    /// Unknown fluid names map to [`FluidType::Unavailable`]; anything that is
    /// not `tanks.<name>.<digits>` is rejected.
    pub fn from_tank_path(path: &str) -> Result<Self> {
        let caps = tank_path_regex()
            .captures(path)
            .ok_or_else(|| Error::InvalidServicePath {
                class: DeviceClass::Tank.to_string(),
                path: path.to_string(),
            })?;

        let fluid = FluidType::from_signalk(&caps[1]).unwrap_or(FluidType::Unavailable);
        let instance = caps[2].parse::<u32>().map_err(|_| Error::InvalidServicePath {
            class: DeviceClass::Tank.to_string(),
            path: path.to_string(),
        })?;

        Ok(Self::tank(fluid, instance))
    }

    /// Derive the bus service name under the given naming scheme.
    pub fn service_name(&self, naming: &ServiceNaming) -> ServiceName {
        let leaf = match self.fluid {
            Some(fluid) => format!("{}_{}_{}", naming.source, fluid.code(), self.instance),
            None => format!("{}_{}", naming.source, self.instance),
        };
        ServiceName(format!("{}.{}.{}", naming.namespace, self.class, leaf))
    }
}

impl std::fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.fluid {
            Some(fluid) => write!(f, "{} {}/{}", self.class, fluid.code(), self.instance),
            None => write!(f, "{} {}", self.class, self.instance),
        }
    }
}

/// Validated namespace and source used to build service names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNaming {
    namespace: String,
    source: String,
}

impl ServiceNaming {
    /// Validate a namespace (dot-separated elements) and a source tag.
    pub fn new(namespace: &str, source: &str) -> Result<Self> {
        for element in namespace.split('.') {
            if !element_regex().is_match(element) {
                return Err(Error::InvalidBusName(namespace.to_string()));
            }
        }
        if !element_regex().is_match(source) {
            return Err(Error::InvalidBusName(source.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            source: source.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Default for ServiceNaming {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// A bus service name such as `com.victronenergy.tank.signalk_0_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object path form: `/` followed by the name with dots as separators.
    pub fn object_path(&self) -> String {
        format!("/{}", self.0.replace('.', "/"))
    }

    /// Recover a service name from its object path form.
    pub fn from_object_path(path: &str) -> Option<Self> {
        let trimmed = path.strip_prefix('/')?;
        let name = Self(trimmed.replace('/', "."));
        if name.is_valid() {
            Some(name)
        } else {
            None
        }
    }

    /// Whether every element is a valid bus name element.
    pub fn is_valid(&self) -> bool {
        self.0.split('.').count() >= 2 && self.0.split('.').all(|e| element_regex().is_match(e))
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a string is a valid bus object path (`/a/b_1/c`).
pub fn is_valid_object_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    match path.strip_prefix('/') {
        Some(rest) => rest.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tank_service_name() {
        let naming = ServiceNaming::default();
        let id = ServiceIdentity::tank(FluidType::FreshWater, 2);
        let name = id.service_name(&naming);

        assert_eq!(name.as_str(), "com.victronenergy.tank.signalk_1_2");
        assert_eq!(name.object_path(), "/com/victronenergy/tank/signalk_1_2");
    }

    #[test]
    fn test_non_tank_service_name() {
        let naming = ServiceNaming::default();
        assert_eq!(
            ServiceIdentity::temperature(3).service_name(&naming).as_str(),
            "com.victronenergy.temperature.signalk_3"
        );
        assert_eq!(
            ServiceIdentity::gps(0).service_name(&naming).as_str(),
            "com.victronenergy.gps.signalk_0"
        );
    }

    #[test]
    fn test_name_path_round_trip() {
        let naming = ServiceNaming::new("org.example.marine", "sk").unwrap();
        let fluids = [
            FluidType::Fuel,
            FluidType::FreshWater,
            FluidType::GreyWater,
            FluidType::LiveWell,
            FluidType::Lubrication,
            FluidType::WasteWater,
            FluidType::Gasoline,
            FluidType::Error,
            FluidType::Unavailable,
        ];
        let mut identities: Vec<ServiceIdentity> = Vec::new();
        for instance in [0, 1, 9, 10, 255, u32::MAX] {
            for fluid in fluids {
                identities.push(ServiceIdentity::tank(fluid, instance));
            }
            identities.push(ServiceIdentity::temperature(instance));
            identities.push(ServiceIdentity::gps(instance));
        }

        for id in identities {
            let name = id.service_name(&naming);
            let path = name.object_path();
            assert!(is_valid_object_path(&path), "invalid path {path}");
            assert_eq!(ServiceName::from_object_path(&path), Some(name));
        }
    }

    #[test]
    fn test_parse_tank_path() {
        let id = ServiceIdentity::from_tank_path("tanks.fuel.0").unwrap();
        assert_eq!(id, ServiceIdentity::tank(FluidType::Fuel, 0));

        let id = ServiceIdentity::from_tank_path("tanks.wasteWater.12").unwrap();
        assert_eq!(id.fluid, Some(FluidType::WasteWater));
        assert_eq!(id.instance, 12);
    }

    #[test]
    fn test_unknown_fluid_is_unavailable() {
        let id = ServiceIdentity::from_tank_path("tanks.ballast.1").unwrap();
        assert_eq!(id.fluid, Some(FluidType::Unavailable));
        assert_eq!(id.fluid.unwrap().code(), 15);
    }

    #[test]
    fn test_invalid_tank_paths() {
        for path in [
            "tanks.fuel",
            "tanks.fuel.main",
            "tanks.fuel.0.currentLevel",
            "tanks.fuel.-1",
            "tanks.fu-el.0",
            "environment.inside",
            "",
        ] {
            assert!(
                matches!(
                    ServiceIdentity::from_tank_path(path),
                    Err(Error::InvalidServicePath { .. })
                ),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_instance_overflow_rejected() {
        assert!(ServiceIdentity::from_tank_path("tanks.fuel.99999999999").is_err());
    }

    #[test]
    fn test_naming_validation() {
        assert!(ServiceNaming::new("com.victronenergy", "signalk").is_ok());
        assert_eq!(
            ServiceNaming::new("com..victron", "signalk").unwrap_err(),
            Error::InvalidBusName("com..victron".to_string())
        );
        assert!(ServiceNaming::new("com.1victron", "signalk").is_err());
        assert!(ServiceNaming::new("com.victronenergy", "signal-k").is_err());
        assert!(ServiceNaming::new("com.victronenergy", "").is_err());
    }

    #[test]
    fn test_object_path_validation() {
        assert!(is_valid_object_path("/"));
        assert!(is_valid_object_path("/Mgmt/ProcessName"));
        assert!(!is_valid_object_path("Mgmt/ProcessName"));
        assert!(!is_valid_object_path("/Mgmt//ProcessName"));
        assert!(!is_valid_object_path("/Mgmt/Process.Name"));
    }
}
