//! Service registration.
//!
//! [`ServiceRegistration`] turns a service identity into an owned bus name.
//! The returned [`RegistrationHandle`] owns the property tree once it is
//! exposed; all reads and writes go through it, and dropping it gives the
//! name back.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sk2venus_core::{
    BusValue, PropertyTree, ServiceIdentity, ServiceName, ServiceNaming, Snapshot,
};

use crate::error::{BusError, Result};
use crate::retry::RetryPolicy;
use crate::transport::{BusTransport, RemoteWrite, ServiceExport};

/// Registers services on one transport.
#[derive(Clone)]
pub struct ServiceRegistration {
    transport: Arc<dyn BusTransport>,
    naming: ServiceNaming,
    retry: RetryPolicy,
}

impl ServiceRegistration {
    pub fn new(transport: Arc<dyn BusTransport>, naming: ServiceNaming) -> Self {
        Self {
            transport,
            naming,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn naming(&self) -> &ServiceNaming {
        &self.naming
    }

    /// Check that the bus is reachable at all.
    pub async fn probe(&self) -> Result<()> {
        self.transport.probe().await
    }

    /// Claim the service name for `identity`.
    ///
    /// Unreachable-bus failures are retried according to the retry policy;
    /// a name owned elsewhere fails immediately.
    pub async fn register(&self, identity: &ServiceIdentity) -> Result<RegistrationHandle> {
        let name = identity.service_name(&self.naming);
        let mut attempt = 1;
        loop {
            match self.transport.request_name(&name).await {
                Ok(()) => {
                    info!("Registered {} as {}", identity, name);
                    return Ok(RegistrationHandle::new(name, self.transport.clone()));
                }
                Err(e) if e.is_transient() && self.retry.allows_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Registering {} failed (attempt {}/{}): {}; retrying in {:?}",
                        name, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// An owned bus name and, once exposed, its property tree.
pub struct RegistrationHandle {
    name: ServiceName,
    transport: Arc<dyn BusTransport>,
    tree: Option<PropertyTree>,
    remote_writes: Option<mpsc::UnboundedReceiver<RemoteWrite>>,
    released: bool,
}

impl RegistrationHandle {
    fn new(name: ServiceName, transport: Arc<dyn BusTransport>) -> Self {
        Self {
            name,
            transport,
            tree: None,
            remote_writes: None,
            released: false,
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn is_exposed(&self) -> bool {
        self.tree.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Publish `tree` on the bus and start serving remote get/set.
    ///
    /// `settable` lists the paths remote clients may write.
    pub async fn expose_tree<I>(&mut self, tree: PropertyTree, settable: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        if self.released {
            return Err(BusError::Released(self.name.to_string()));
        }
        if self.tree.is_some() {
            return Err(BusError::AlreadyExposed(self.name.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let export = ServiceExport {
            name: self.name.clone(),
            snapshot: tree.snapshot(),
            settable: settable.into_iter().collect::<HashSet<_>>(),
            writes: tx,
        };
        self.transport.expose(export).await?;

        debug!("Exposed {} paths on {}", tree.len(), self.name);
        self.tree = Some(tree);
        self.remote_writes = Some(rx);
        Ok(())
    }

    fn tree(&self) -> Result<&PropertyTree> {
        if self.released {
            return Err(BusError::Released(self.name.to_string()));
        }
        self.tree
            .as_ref()
            .ok_or_else(|| BusError::NotExposed(self.name.to_string()))
    }

    fn tree_mut(&mut self) -> Result<&mut PropertyTree> {
        if self.released {
            return Err(BusError::Released(self.name.to_string()));
        }
        self.tree
            .as_mut()
            .ok_or_else(|| BusError::NotExposed(self.name.to_string()))
    }

    pub fn get(&self, path: &str) -> Result<BusValue> {
        Ok(self.tree()?.get(path)?.clone())
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.tree()?.snapshot())
    }

    /// Store a value without notifying. Returns whether it changed.
    pub fn set(&mut self, path: &str, value: BusValue) -> Result<bool> {
        Ok(self.tree_mut()?.set(path, value)?)
    }

    /// Notify listeners of `path` if it is dirty. Returns whether anything was sent.
    pub fn publish_change(&mut self, path: &str) -> Result<bool> {
        let tree = self.tree_mut()?;
        if !tree.take_dirty(path)? {
            return Ok(false);
        }
        let value = tree.get(path)?.clone();
        self.transport.emit_changed(&self.name, path, &value);
        Ok(true)
    }

    /// `set` followed by `publish_change`.
    pub fn write(&mut self, path: &str, value: BusValue) -> Result<bool> {
        self.set(path, value)?;
        self.publish_change(path)
    }

    /// Apply writes made by remote clients. Returns how many were applied.
    ///
    /// The transport already republished them, so they are not sent again.
    pub fn sync_remote_writes(&mut self) -> Result<usize> {
        let mut pending = Vec::new();
        if let Some(rx) = self.remote_writes.as_mut() {
            while let Ok(write) = rx.try_recv() {
                pending.push(write);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let name = self.name.clone();
        let tree = self.tree_mut()?;
        let mut applied = 0;
        for write in pending {
            match tree.set(&write.path, write.value) {
                Ok(_) => {
                    tree.take_dirty(&write.path)?;
                    applied += 1;
                }
                Err(e) => warn!("Dropping remote write on {}: {}", name, e),
            }
        }
        Ok(applied)
    }

    /// Give the name back. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.remote_writes = None;
        self.transport.release_name(&self.name);
        info!("Released {}", self.name);
        true
    }
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("name", &self.name)
            .field("exposed", &self.tree.is_some())
            .field("released", &self.released)
            .finish()
    }
}
