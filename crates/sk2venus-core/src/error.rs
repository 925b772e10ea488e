//! Errors raised by the property model and device adapters.

use crate::value::ValueType;

/// Errors that can occur while declaring, reading or writing service state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A property path was declared twice in the same tree.
    #[error("Duplicate property path: {0}")]
    DuplicatePath(String),

    /// A property path was used without being declared.
    #[error("Unknown property path: {0}")]
    UnknownPath(String),

    /// A value does not match the declared type of its property.
    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: ValueType,
        actual: ValueType,
    },

    /// An adapter received a source key it does not declare.
    #[error("Unrecognized source key: {0}")]
    UnrecognizedKey(String),

    /// An adapter was asked to apply a value after being stopped.
    #[error("Adapter for {0} is stopped")]
    AdapterStopped(String),

    /// A Signal K path could not be turned into a service identity.
    #[error("Invalid service path for {class}: {path}")]
    InvalidServicePath { class: String, path: String },

    /// A source value had the wrong shape for its key.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// A bus name element contains characters the bus does not accept.
    #[error("Invalid bus name element: {0:?}")]
    InvalidBusName(String),

    /// An adapter lifecycle step was taken out of order.
    #[error("Invalid adapter transition for {service}: {from} -> {to}")]
    InvalidTransition {
        service: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
