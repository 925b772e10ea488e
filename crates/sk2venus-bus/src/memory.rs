//! In-process bus.
//!
//! `MemoryBus` behaves like a bus daemon with one client per service: it
//! arbitrates name ownership, keeps the served values, and records every
//! change notification. Tests drive it directly; the binary uses it for dry
//! runs without a system bus.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use sk2venus_core::{BusValue, Error as CoreError, ServiceName};

use crate::error::{BusError, Result};
use crate::transport::{BusTransport, RemoteWrite, ServiceExport};

/// A change notification as listeners would have seen it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSignal {
    pub service: ServiceName,
    pub path: String,
    pub value: BusValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Local,
    Foreign,
}

#[derive(Debug)]
struct ServedTree {
    values: Vec<(String, BusValue)>,
    settable: HashSet<String>,
    writes: mpsc::UnboundedSender<RemoteWrite>,
}

impl ServedTree {
    fn value_mut(&mut self, path: &str) -> Option<&mut BusValue> {
        self.values
            .iter_mut()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Default)]
struct State {
    owners: HashMap<ServiceName, Owner>,
    served: HashMap<ServiceName, ServedTree>,
    signals: Vec<ChangeSignal>,
    down: bool,
    failures_left: u32,
    name_requests: u32,
}

/// Cloneable handle to a shared in-memory bus.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<State>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `name` as owned by some other process.
    pub fn occupy(&self, name: &ServiceName) {
        self.lock().owners.insert(name.clone(), Owner::Foreign);
    }

    /// Take the whole bus down (or bring it back).
    pub fn set_down(&self, down: bool) {
        self.lock().down = down;
    }

    /// Fail the next `n` name requests as if the bus were unreachable.
    pub fn fail_next_requests(&self, n: u32) {
        self.lock().failures_left = n;
    }

    /// Number of name requests seen, including failed ones.
    pub fn name_requests(&self) -> u32 {
        self.lock().name_requests
    }

    /// Whether `name` is currently owned by this process.
    pub fn owns(&self, name: &ServiceName) -> bool {
        self.lock().owners.get(name) == Some(&Owner::Local)
    }

    /// Names owned by this process, sorted.
    pub fn owned_names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self
            .lock()
            .owners
            .iter()
            .filter(|(_, owner)| **owner == Owner::Local)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether `name` has an exposed tree.
    pub fn is_served(&self, name: &ServiceName) -> bool {
        self.lock().served.contains_key(name)
    }

    /// Read a served value the way a remote client would.
    pub fn value(&self, name: &ServiceName, path: &str) -> Option<BusValue> {
        let state = self.lock();
        let tree = state.served.get(name)?;
        tree.values
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
    }

    /// All served paths of `name`, in declaration order.
    pub fn paths(&self, name: &ServiceName) -> Vec<String> {
        self.lock()
            .served
            .get(name)
            .map(|t| t.values.iter().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Write a value the way a remote client would.
    pub fn remote_set(&self, name: &ServiceName, path: &str, value: BusValue) -> Result<()> {
        let mut state = self.lock();
        let tree = state
            .served
            .get_mut(name)
            .ok_or_else(|| BusError::NotExposed(name.to_string()))?;
        if !tree.settable.contains(path) {
            return Err(BusError::ReadOnlyPath {
                service: name.to_string(),
                path: path.to_string(),
            });
        }
        let slot = tree
            .value_mut(path)
            .ok_or_else(|| CoreError::UnknownPath(path.to_string()))?;
        if slot.value_type() != value.value_type() {
            return Err(CoreError::TypeMismatch {
                path: path.to_string(),
                expected: slot.value_type(),
                actual: value.value_type(),
            }
            .into());
        }
        *slot = value.clone();
        let write = RemoteWrite {
            path: path.to_string(),
            value: value.clone(),
        };
        if tree.writes.send(write).is_err() {
            debug!("Memory bus: {} no longer listening, write to {} not forwarded", name, path);
        }
        state.signals.push(ChangeSignal {
            service: name.clone(),
            path: path.to_string(),
            value,
        });
        Ok(())
    }

    /// Every change notification emitted so far.
    pub fn signals(&self) -> Vec<ChangeSignal> {
        self.lock().signals.clone()
    }

    /// Change notifications for one service path.
    pub fn signals_for(&self, name: &ServiceName, path: &str) -> Vec<BusValue> {
        self.lock()
            .signals
            .iter()
            .filter(|s| &s.service == name && s.path == path)
            .map(|s| s.value.clone())
            .collect()
    }

    pub fn clear_signals(&self) {
        self.lock().signals.clear();
    }
}

#[async_trait]
impl BusTransport for MemoryBus {
    async fn probe(&self) -> Result<()> {
        if self.lock().down {
            return Err(BusError::TransportUnavailable("memory bus is down".to_string()));
        }
        Ok(())
    }

    async fn request_name(&self, name: &ServiceName) -> Result<()> {
        let mut state = self.lock();
        state.name_requests += 1;
        if state.down {
            return Err(BusError::TransportUnavailable("memory bus is down".to_string()));
        }
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(BusError::TransportUnavailable(
                "connection refused".to_string(),
            ));
        }
        if state.owners.contains_key(name) {
            return Err(BusError::NameInUse(name.to_string()));
        }
        state.owners.insert(name.clone(), Owner::Local);
        debug!("Memory bus: {} acquired", name);
        Ok(())
    }

    async fn expose(&self, export: ServiceExport) -> Result<()> {
        let mut state = self.lock();
        if state.owners.get(&export.name) != Some(&Owner::Local) {
            return Err(BusError::Released(export.name.to_string()));
        }
        if state.served.contains_key(&export.name) {
            return Err(BusError::AlreadyExposed(export.name.to_string()));
        }
        let values = export
            .snapshot
            .iter()
            .map(|(p, v)| (p.to_string(), v.clone()))
            .collect();
        state.served.insert(
            export.name,
            ServedTree {
                values,
                settable: export.settable,
                writes: export.writes,
            },
        );
        Ok(())
    }

    fn emit_changed(&self, name: &ServiceName, path: &str, value: &BusValue) {
        let mut state = self.lock();
        let Some(tree) = state.served.get_mut(name) else {
            return;
        };
        if let Some(slot) = tree.value_mut(path) {
            *slot = value.clone();
        }
        state.signals.push(ChangeSignal {
            service: name.clone(),
            path: path.to_string(),
            value: value.clone(),
        });
    }

    fn release_name(&self, name: &ServiceName) {
        let mut state = self.lock();
        if state.owners.get(name) == Some(&Owner::Local) {
            state.owners.remove(name);
            state.served.remove(name);
            debug!("Memory bus: {} released", name);
        }
    }
}
