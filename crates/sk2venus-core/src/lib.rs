//! # sk2venus-core
//!
//! Core Venus OS service model for the Signal K to Venus bridge.
//!
//! This crate provides:
//! - Typed bus values and property definitions
//! - The per-service property tree with dirty tracking
//! - Service identity and bus name derivation
//! - Device adapters (tank, temperature, GPS) mapping Signal K keys to properties
//! - Service descriptors as they appear in configuration
//! - Traits describing the host collaborators (value stream, lookup, status)
//!
//! This crate is intentionally runtime-agnostic and contains no async code.
//! Bus transports and the update loop live in the crates built on top of it.

pub mod adapter;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod property;
pub mod tree;
pub mod value;

pub use adapter::{AdapterState, DeviceAdapter, PropertyWrite};
pub use config::{ManagementInfo, ServiceDescriptor, TankFactors};
pub use error::{Error, Result};
pub use host::{join_path, split_key, EventSource, SourceEvent, StatusSink, SubscriptionId, ValueSource};
pub use identity::{DeviceClass, FluidType, ServiceIdentity, ServiceName, ServiceNaming};
pub use property::PropertyDefinition;
pub use tree::{PropertyTree, Snapshot};
pub use value::{BusValue, ValueType};
