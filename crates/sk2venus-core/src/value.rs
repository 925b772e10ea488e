//! Typed values carried on the bus.
//!
//! Venus OS services publish every property as a D-Bus variant. Only three
//! shapes are used by the bridged device classes: 32-bit integers, doubles
//! and strings.

use serde::{Deserialize, Serialize};

/// Type tag of a bus property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int32,
    Float,
    String,
}

impl ValueType {
    /// D-Bus signature character for this type.
    pub fn signature(&self) -> char {
        match self {
            ValueType::Int32 => 'i',
            ValueType::Float => 'd',
            ValueType::String => 's',
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ValueType::Int32 => "int32",
            ValueType::Float => "float",
            ValueType::String => "string",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored in a property tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusValue {
    Int32(i32),
    Float(f64),
    String(String),
}

impl BusValue {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            BusValue::Int32(_) => ValueType::Int32,
            BusValue::Float(_) => ValueType::Float,
            BusValue::String(_) => ValueType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Int32(v) => Some(f64::from(*v)),
            BusValue::Float(v) => Some(*v),
            BusValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BusValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable rendering used for the Venus `GetText` call.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for BusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusValue::Int32(v) => write!(f, "{}", v),
            BusValue::Float(v) => write!(f, "{}", v),
            BusValue::String(s) => f.write_str(s),
        }
    }
}

impl From<i32> for BusValue {
    fn from(v: i32) -> Self {
        BusValue::Int32(v)
    }
}

impl From<f64> for BusValue {
    fn from(v: f64) -> Self {
        BusValue::Float(v)
    }
}

impl From<&str> for BusValue {
    fn from(v: &str) -> Self {
        BusValue::String(v.to_string())
    }
}

impl From<String> for BusValue {
    fn from(v: String) -> Self {
        BusValue::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_tags() {
        assert_eq!(BusValue::from(1).value_type(), ValueType::Int32);
        assert_eq!(BusValue::from(1.5).value_type(), ValueType::Float);
        assert_eq!(BusValue::from("x").value_type(), ValueType::String);
        assert_eq!(ValueType::Float.signature(), 'd');
    }

    #[test]
    fn test_untagged_serialization() {
        let json = serde_json::to_string(&vec![
            BusValue::from(15),
            BusValue::from(0.5),
            BusValue::from("n/a"),
        ])
        .unwrap();
        assert_eq!(json, r#"[15,0.5,"n/a"]"#);
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(BusValue::from(42).text(), "42");
        assert_eq!(BusValue::from(12.5).text(), "12.5");
        assert_eq!(BusValue::from("Signal K").text(), "Signal K");
    }
}
