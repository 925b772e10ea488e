//! Device adapters.
//!
//! An adapter declares the fixed property schema of one device class and
//! turns incoming Signal K values into property writes. The set of device
//! classes is closed: tank, temperature and GPS. All three are driven through
//! the same contract on [`DeviceAdapter`]:
//!
//! - [`DeviceAdapter::schema`] - property definitions, fixed at construction
//! - [`DeviceAdapter::trigger_key`] - the key whose arrival recomputes and publishes
//! - [`DeviceAdapter::static_keys`] - keys that only prime derived state
//! - [`DeviceAdapter::apply`] - map one key/value to the writes to perform
//!
//! Each adapter also tracks its lifecycle:
//! `Constructed -> SchemaDeclared -> Registered -> Active -> Stopped`.

mod gps;
mod tank;
mod temperature;

pub use gps::GpsAdapter;
pub use tank::TankAdapter;
pub use temperature::TemperatureAdapter;

use serde_json::Value;

use crate::config::ManagementInfo;
use crate::error::{Error, Result};
use crate::identity::{DeviceClass, ServiceIdentity};
use crate::property::PropertyDefinition;
use crate::tree::PropertyTree;
use crate::value::BusValue;

/// One property write produced by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    pub path: String,
    pub value: BusValue,
}

impl PropertyWrite {
    pub fn new(path: &str, value: impl Into<BusValue>) -> Self {
        Self {
            path: path.to_string(),
            value: value.into(),
        }
    }
}

/// Lifecycle of an adapter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Constructed,
    SchemaDeclared,
    Registered,
    Active,
    Stopped,
}

impl AdapterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterState::Constructed => "constructed",
            AdapterState::SchemaDeclared => "schema-declared",
            AdapterState::Registered => "registered",
            AdapterState::Active => "active",
            AdapterState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
enum Variant {
    Tank(TankAdapter),
    Temperature(TemperatureAdapter),
    Gps(GpsAdapter),
}

/// A device adapter: schema, key mapping, derived state and lifecycle.
#[derive(Debug, Clone)]
pub struct DeviceAdapter {
    identity: ServiceIdentity,
    schema: Vec<PropertyDefinition>,
    variant: Variant,
    state: AdapterState,
}

impl DeviceAdapter {
    /// Tank adapter with the given capacity and level scale factors.
    pub fn tank(
        identity: ServiceIdentity,
        management: &ManagementInfo,
        custom_name: Option<&str>,
        capacity_factor: f64,
        level_factor: f64,
    ) -> Self {
        let adapter = TankAdapter::new(capacity_factor, level_factor);
        let mut schema = device_properties(&identity, management, custom_name);
        schema.extend(adapter.properties(&identity));
        Self::with_variant(identity, schema, Variant::Tank(adapter))
    }

    /// Temperature adapter converting Kelvin to Celsius.
    pub fn temperature(
        identity: ServiceIdentity,
        management: &ManagementInfo,
        custom_name: Option<&str>,
    ) -> Self {
        let adapter = TemperatureAdapter::new();
        let mut schema = device_properties(&identity, management, custom_name);
        schema.extend(adapter.properties());
        Self::with_variant(identity, schema, Variant::Temperature(adapter))
    }

    /// GPS adapter passing positions through a scale factor.
    pub fn gps(
        identity: ServiceIdentity,
        management: &ManagementInfo,
        custom_name: Option<&str>,
        factor: f64,
    ) -> Self {
        let adapter = GpsAdapter::new(factor);
        let mut schema = device_properties(&identity, management, custom_name);
        schema.extend(adapter.properties());
        Self::with_variant(identity, schema, Variant::Gps(adapter))
    }

    fn with_variant(
        identity: ServiceIdentity,
        schema: Vec<PropertyDefinition>,
        variant: Variant,
    ) -> Self {
        Self {
            identity,
            schema,
            variant,
            state: AdapterState::Constructed,
        }
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn class(&self) -> DeviceClass {
        self.identity.class
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// The fixed property schema of this device.
    pub fn schema(&self) -> &[PropertyDefinition] {
        &self.schema
    }

    /// The source key whose arrival recomputes and publishes every derived property.
    pub fn trigger_key(&self) -> &'static str {
        match &self.variant {
            Variant::Tank(_) => tank::LEVEL_KEY,
            Variant::Temperature(_) => temperature::TEMPERATURE_KEY,
            Variant::Gps(_) => gps::POSITION_KEY,
        }
    }

    /// Every other source key this adapter consumes.
    pub fn static_keys(&self) -> Vec<&str> {
        let trigger = self.trigger_key();
        let mut keys: Vec<&str> = Vec::new();
        for key in self.schema.iter().filter_map(|d| d.source_key.as_deref()) {
            if key != trigger && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Paths remote bus clients may write.
    pub fn settable_paths(&self) -> Vec<String> {
        self.schema
            .iter()
            .filter(|d| d.settable)
            .map(|d| d.path.clone())
            .collect()
    }

    fn declares_key(&self, key: &str) -> bool {
        self.schema
            .iter()
            .any(|d| d.source_key.as_deref() == Some(key))
    }

    /// Map one source value to the property writes it causes.
    ///
    /// Updates derived state as a side effect. The first successful call after
    /// registration moves the adapter to `Active`.
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<Vec<PropertyWrite>> {
        if self.state == AdapterState::Stopped {
            return Err(Error::AdapterStopped(self.identity.to_string()));
        }
        if !self.declares_key(key) {
            return Err(Error::UnrecognizedKey(key.to_string()));
        }

        let writes = match &mut self.variant {
            Variant::Tank(tank) => tank.apply(key, value)?,
            Variant::Temperature(temperature) => temperature.apply(key, value)?,
            Variant::Gps(gps) => gps.apply(key, value)?,
        };

        if self.state == AdapterState::Registered {
            self.state = AdapterState::Active;
        }
        Ok(writes)
    }

    /// Build the property tree for this schema.
    pub fn declare_schema(&mut self) -> Result<PropertyTree> {
        self.transition(AdapterState::Constructed, AdapterState::SchemaDeclared)?;
        PropertyTree::from_schema(&self.schema)
    }

    /// Record that the service is registered on the bus.
    pub fn mark_registered(&mut self) -> Result<()> {
        self.transition(AdapterState::SchemaDeclared, AdapterState::Registered)
    }

    /// Stop the adapter. Returns false if it was already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == AdapterState::Stopped {
            return false;
        }
        self.state = AdapterState::Stopped;
        true
    }

    fn transition(&mut self, from: AdapterState, to: AdapterState) -> Result<()> {
        if self.state != from {
            return Err(Error::InvalidTransition {
                service: self.identity.to_string(),
                from: self.state.as_str(),
                to: to.as_str(),
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Properties every Venus OS device service exposes.
fn device_properties(
    identity: &ServiceIdentity,
    management: &ManagementInfo,
    custom_name: Option<&str>,
) -> Vec<PropertyDefinition> {
    vec![
        PropertyDefinition::fixed("/Mgmt/ProcessName", management.process_name.as_str()),
        PropertyDefinition::fixed("/Mgmt/ProcessVersion", management.process_version.as_str()),
        PropertyDefinition::fixed("/Mgmt/Connection", management.connection.as_str()),
        PropertyDefinition::fixed("/DeviceInstance", device_instance(identity)),
        PropertyDefinition::fixed("/ProductId", management.product_id.as_str()),
        PropertyDefinition::fixed("/ProductName", management.product_name.as_str()),
        PropertyDefinition::fixed("/FirmwareVersion", management.firmware_version.as_str()),
        PropertyDefinition::fixed("/HardwareVersion", management.hardware_version.as_str()),
        PropertyDefinition::fixed("/Connected", 1),
        PropertyDefinition::fixed("/CustomName", custom_name.unwrap_or_default()).settable(),
    ]
}

/// `/DeviceInstance` is an int32 on the bus; larger instances saturate.
fn device_instance(identity: &ServiceIdentity) -> i32 {
    i32::try_from(identity.instance).unwrap_or(i32::MAX)
}

/// Read a numeric source value.
fn number(key: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| Error::InvalidValue {
        key: key.to_string(),
        reason: format!("expected a number, got {}", value),
    })
}
