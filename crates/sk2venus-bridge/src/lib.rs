//! # sk2venus-bridge
//!
//! Update dispatch and lifecycle for the Signal K to Venus OS bridge.
//!
//! The [`Bridge`] registers one bus service per configured device, binds it
//! to its Signal K trigger path through the [`UpdateDispatcher`], and
//! processes values from a single bounded queue until shutdown.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod status;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use dispatcher::{Host, UpdateDispatcher};
pub use error::{BridgeError, Result};
pub use status::{StatusBoard, StatusEntry, StatusLevel, StatusSummary};
