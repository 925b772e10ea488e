//! Temperature adapter.

use serde_json::Value;

use super::{number, PropertyWrite};
use crate::error::{Error, Result};
use crate::property::PropertyDefinition;

/// Signal K key carrying the temperature in Kelvin.
pub(crate) const TEMPERATURE_KEY: &str = "temperature";

/// Offset between Kelvin and the Celsius value Venus OS displays.
const KELVIN_OFFSET: f64 = 273.0;

/// Venus OS temperature type "generic".
const GENERIC_TEMPERATURE: i32 = 2;

/// Publishes `/Temperature` in Celsius. No derived state.
#[derive(Debug, Clone, Default)]
pub struct TemperatureAdapter;

impl TemperatureAdapter {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::fixed("/Temperature", 0.0).sourced_from(TEMPERATURE_KEY),
            PropertyDefinition::fixed("/TemperatureType", GENERIC_TEMPERATURE),
        ]
    }

    pub(crate) fn apply(&mut self, key: &str, value: &Value) -> Result<Vec<PropertyWrite>> {
        if key != TEMPERATURE_KEY {
            return Err(Error::UnrecognizedKey(key.to_string()));
        }
        let kelvin = number(key, value)?;
        Ok(vec![PropertyWrite::new("/Temperature", kelvin - KELVIN_OFFSET)])
    }
}
