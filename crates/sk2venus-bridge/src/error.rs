//! Bridge error types.

use thiserror::Error;

use sk2venus_bus::BusError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Property(#[from] sk2venus_core::Error),

    /// An event arrived for a path no service is bound to.
    #[error("no service is bound to {0}")]
    UnboundPath(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the bus could not be reached at all.
    pub fn is_transport_unavailable(&self) -> bool {
        matches!(self, BridgeError::Bus(BusError::TransportUnavailable(_)))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
