//! Bus error types.

use thiserror::Error;

/// Errors raised while registering services or exchanging values with the bus.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    #[error("bus name {0} is owned by another connection")]
    NameInUse(String),

    #[error("bus transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("property tree of {0} is already exposed")]
    AlreadyExposed(String),

    #[error("property tree of {0} has not been exposed")]
    NotExposed(String),

    #[error("registration of {0} has been released")]
    Released(String),

    #[error("{path} on {service} is not settable")]
    ReadOnlyPath { service: String, path: String },

    #[error(transparent)]
    Property(#[from] sk2venus_core::Error),
}

impl BusError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::TransportUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
