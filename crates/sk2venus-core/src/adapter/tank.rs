//! Tank level adapter.

use serde_json::Value;

use super::{number, PropertyWrite};
use crate::error::{Error, Result};
use crate::identity::{FluidType, ServiceIdentity};
use crate::property::PropertyDefinition;

/// Signal K key carrying the fill level as a fraction (0.0 - 1.0).
pub(crate) const LEVEL_KEY: &str = "currentLevel";

/// Signal K key carrying the tank capacity in cubic metres.
pub(crate) const CAPACITY_KEY: &str = "capacity";

/// Derives `/Level`, `/Capacity` and `/Remaining` for one tank.
///
/// Capacity is primed from its static key; until it arrives `/Remaining`
/// stays at zero.
#[derive(Debug, Clone)]
pub struct TankAdapter {
    capacity_factor: f64,
    level_factor: f64,
    capacity: f64,
}

impl TankAdapter {
    pub fn new(capacity_factor: f64, level_factor: f64) -> Self {
        Self {
            capacity_factor,
            level_factor,
            capacity: 0.0,
        }
    }

    /// Current scaled capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn properties(&self, identity: &ServiceIdentity) -> Vec<PropertyDefinition> {
        let fluid = identity.fluid.unwrap_or(FluidType::Unavailable);
        vec![
            PropertyDefinition::fixed("/Level", 0.0)
                .sourced_from(LEVEL_KEY)
                .scaled(self.level_factor),
            PropertyDefinition::fixed("/FluidType", fluid.code()),
            PropertyDefinition::fixed("/Capacity", 0.0)
                .sourced_from(CAPACITY_KEY)
                .scaled(self.capacity_factor),
            PropertyDefinition::fixed("/Remaining", 0.0),
        ]
    }

    pub(crate) fn apply(&mut self, key: &str, value: &Value) -> Result<Vec<PropertyWrite>> {
        match key {
            CAPACITY_KEY => {
                self.capacity = number(key, value)? * self.capacity_factor;
                Ok(vec![PropertyWrite::new("/Capacity", self.capacity)])
            }
            LEVEL_KEY => {
                let fraction = number(key, value)?;
                Ok(vec![
                    PropertyWrite::new("/Level", (fraction * self.level_factor).round()),
                    PropertyWrite::new("/Remaining", self.capacity * fraction),
                ])
            }
            _ => Err(Error::UnrecognizedKey(key.to_string())),
        }
    }
}
