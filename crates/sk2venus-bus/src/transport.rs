//! The seam between service registration and a concrete bus.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sk2venus_core::{BusValue, ServiceName, Snapshot};

use crate::error::Result;

/// A value written by a remote bus client to a settable path.
///
/// The transport has already stored and republished it; the registration
/// handle only needs to bring its tree up to date.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub path: String,
    pub value: BusValue,
}

/// Everything a transport needs to serve one service's property tree.
#[derive(Debug)]
pub struct ServiceExport {
    pub name: ServiceName,
    /// Initial contents, in declaration order.
    pub snapshot: Snapshot,
    /// Paths remote clients may write.
    pub settable: HashSet<String>,
    /// Accepted remote writes are forwarded here.
    pub writes: mpsc::UnboundedSender<RemoteWrite>,
}

impl ServiceExport {
    pub fn is_settable(&self, path: &str) -> bool {
        self.settable.contains(path)
    }
}

/// A bus that can own service names and serve property values.
///
/// `emit_changed` and `release_name` are synchronous and must not block:
/// they are called from the dispatcher loop and from `Drop`.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Check that the bus can be reached at all.
    async fn probe(&self) -> Result<()>;

    /// Request exclusive ownership of `name`. Never queues behind another owner.
    async fn request_name(&self, name: &ServiceName) -> Result<()>;

    /// Publish the initial tree and start answering remote get/set.
    async fn expose(&self, export: ServiceExport) -> Result<()>;

    /// Store a new value and notify listeners.
    fn emit_changed(&self, name: &ServiceName, path: &str, value: &BusValue);

    /// Give up `name` and stop serving its tree. Unknown names are ignored.
    fn release_name(&self, name: &ServiceName);
}
