//! # sk2venus-bus
//!
//! Service registration on a Venus OS style bus.
//!
//! - [`BusTransport`] is the seam to a concrete bus
//! - [`MemoryBus`] is an in-process bus for tests and dry runs
//! - [`ServiceRegistration`] claims service names with bounded retry and
//!   hands out [`RegistrationHandle`]s that own the property tree
//!
//! Enable the `dbus` feature for the zbus based transport.

pub mod error;
pub mod memory;
pub mod registration;
pub mod retry;
pub mod settings;
pub mod transport;

#[cfg(feature = "dbus")]
pub mod dbus;

pub use error::{BusError, Result};
pub use memory::{ChangeSignal, MemoryBus};
pub use registration::{RegistrationHandle, ServiceRegistration};
pub use retry::RetryPolicy;
pub use settings::{BusKind, BusSettings};
pub use transport::{BusTransport, RemoteWrite, ServiceExport};

#[cfg(feature = "dbus")]
pub use dbus::{DbusTransport, Endpoint};
