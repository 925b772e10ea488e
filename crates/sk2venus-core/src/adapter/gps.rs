//! GPS position adapter.
//!
//! Positions pass straight through with a configurable scale factor; there is
//! no derivation chain and no static key.

use serde::Deserialize;
use serde_json::Value;

use super::PropertyWrite;
use crate::error::{Error, Result};
use crate::property::PropertyDefinition;

/// Signal K key carrying the position object.
pub(crate) const POSITION_KEY: &str = "position";

/// Position object as sent by Signal K under `navigation.position`.
#[derive(Debug, Deserialize)]
struct Position {
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GpsAdapter {
    factor: f64,
}

impl GpsAdapter {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    pub(crate) fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::fixed("/Fix", 0),
            PropertyDefinition::fixed("/Position/Latitude", 0.0)
                .sourced_from(POSITION_KEY)
                .scaled(self.factor),
            PropertyDefinition::fixed("/Position/Longitude", 0.0).scaled(self.factor),
            PropertyDefinition::fixed("/Altitude", 0.0),
        ]
    }

    pub(crate) fn apply(&mut self, key: &str, value: &Value) -> Result<Vec<PropertyWrite>> {
        if key != POSITION_KEY {
            return Err(Error::UnrecognizedKey(key.to_string()));
        }
        let position: Position =
            serde_json::from_value(value.clone()).map_err(|e| Error::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let mut writes = vec![
            PropertyWrite::new("/Position/Latitude", position.latitude * self.factor),
            PropertyWrite::new("/Position/Longitude", position.longitude * self.factor),
        ];
        if let Some(altitude) = position.altitude {
            writes.push(PropertyWrite::new("/Altitude", altitude));
        }
        writes.push(PropertyWrite::new("/Fix", 1));
        Ok(writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeviceAdapter;
    use crate::config::ManagementInfo;
    use crate::identity::ServiceIdentity;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_position_pass_through() {
        let mut adapter =
            DeviceAdapter::gps(ServiceIdentity::gps(0), &ManagementInfo::default(), None, 1.0);
        let writes = adapter
            .apply(
                "position",
                &json!({"latitude": 52.0987654, "longitude": 4.9876545}),
            )
            .unwrap();

        assert_eq!(
            writes,
            vec![
                PropertyWrite::new("/Position/Latitude", 52.0987654),
                PropertyWrite::new("/Position/Longitude", 4.9876545),
                PropertyWrite::new("/Fix", 1),
            ]
        );
    }

    #[test]
    fn test_scale_and_altitude() {
        let mut gps = GpsAdapter::new(2.0);
        let writes = gps
            .apply(
                "position",
                &json!({"latitude": 10.0, "longitude": -20.0, "altitude": 3.5}),
            )
            .unwrap();

        assert_eq!(writes[0], PropertyWrite::new("/Position/Latitude", 20.0));
        assert_eq!(writes[1], PropertyWrite::new("/Position/Longitude", -40.0));
        assert_eq!(writes[2], PropertyWrite::new("/Altitude", 3.5));
    }

    #[test]
    fn test_malformed_position() {
        let mut gps = GpsAdapter::new(1.0);
        let err = gps.apply("position", &json!(52.1)).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }
}
