//! Property definitions declared by device adapters.

use crate::value::{BusValue, ValueType};

/// Declaration of one property in a service's tree.
///
/// Definitions are fixed when an adapter is constructed; the set of
/// definitions for a device class never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    /// Bus-tree identifier (e.g. "/Level").
    pub path: String,
    /// Declared type of the stored value.
    pub value_type: ValueType,
    /// Value published at registration time.
    pub initial: BusValue,
    /// Signal K key whose arrival updates this property.
    pub source_key: Option<String>,
    /// Multiplier applied to incoming source values.
    pub scale: Option<f64>,
    /// Whether remote bus clients may write this property.
    pub settable: bool,
}

impl PropertyDefinition {
    /// A property with a fixed value and no source key.
    pub fn fixed(path: &str, initial: impl Into<BusValue>) -> Self {
        let initial = initial.into();
        Self {
            path: path.to_string(),
            value_type: initial.value_type(),
            initial,
            source_key: None,
            scale: None,
            settable: false,
        }
    }

    /// Attach the Signal K key that feeds this property.
    pub fn sourced_from(mut self, key: &str) -> Self {
        self.source_key = Some(key.to_string());
        self
    }

    /// Attach a scale factor.
    pub fn scaled(mut self, factor: f64) -> Self {
        self.scale = Some(factor);
        self
    }

    /// Allow remote writes.
    pub fn settable(mut self) -> Self {
        self.settable = true;
        self
    }

    /// The scale factor, or 1.0 when none was declared.
    pub fn scale_or_unit(&self) -> f64 {
        self.scale.unwrap_or(1.0)
    }
}
