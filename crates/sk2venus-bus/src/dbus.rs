//! D-Bus transport.
//!
//! Each service gets its own connection, as Venus OS drivers do, so every
//! property can live at its plain object path (`/Level`, `/Mgmt/Connection`).
//! Properties implement `com.victronenergy.BusItem`. The service object at
//! the name's object path (`/com/victronenergy/tank/signalk_0_0`) answers
//! `GetValue`, `GetText` and `GetItems` for the whole tree, and so does `/`.
//!
//! Change signals and name releases are queued to a background task so that
//! [`BusTransport::emit_changed`] and [`BusTransport::release_name`] never block.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::zvariant::{OwnedValue, Value};
use zbus::{dbus_interface, Connection, ConnectionBuilder, SignalContext};

use sk2venus_core::{BusValue, ServiceName, ValueType};

use crate::error::{BusError, Result};
use crate::transport::{BusTransport, RemoteWrite, ServiceExport};

/// Interface implemented by every property object.
pub const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";

/// `SetValue` reply codes.
const SET_OK: i32 = 0;
const SET_REJECTED: i32 = -1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable(e: zbus::Error) -> BusError {
    BusError::TransportUnavailable(e.to_string())
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    System,
    Address(String),
}

/// Values and write policy of one exposed service, shared with its objects.
struct ServiceState {
    values: Mutex<HashMap<String, BusValue>>,
    order: Vec<String>,
    settable: HashSet<String>,
    writes: mpsc::UnboundedSender<RemoteWrite>,
}

impl ServiceState {
    fn value(&self, path: &str) -> Option<BusValue> {
        lock(&self.values).get(path).cloned()
    }

    /// Validate and store a remote write. Returns the value as stored.
    fn accept(&self, path: &str, value: &Value<'_>) -> Option<BusValue> {
        if !self.settable.contains(path) {
            return None;
        }
        let mut values = lock(&self.values);
        let current = values.get_mut(path)?;
        let incoming = coerce(from_variant(value)?, current.value_type())?;
        *current = incoming.clone();
        drop(values);

        let write = RemoteWrite {
            path: path.to_string(),
            value: incoming.clone(),
        };
        if self.writes.send(write).is_err() {
            debug!("Service no longer listening, write to {} not forwarded", path);
        }
        Some(incoming)
    }
}

fn to_variant(value: &BusValue) -> OwnedValue {
    match value {
        BusValue::Int32(v) => OwnedValue::from(Value::from(*v)),
        BusValue::Float(v) => OwnedValue::from(Value::from(*v)),
        BusValue::String(s) => OwnedValue::from(Value::from(s.clone())),
    }
}

fn from_variant(value: &Value<'_>) -> Option<BusValue> {
    match value {
        Value::Value(inner) => from_variant(inner),
        Value::I32(v) => Some(BusValue::Int32(*v)),
        Value::I16(v) => Some(BusValue::Int32(i32::from(*v))),
        Value::U8(v) => Some(BusValue::Int32(i32::from(*v))),
        Value::U16(v) => Some(BusValue::Int32(i32::from(*v))),
        Value::U32(v) => i32::try_from(*v).ok().map(BusValue::Int32),
        Value::I64(v) => i32::try_from(*v).ok().map(BusValue::Int32),
        Value::F64(v) => Some(BusValue::Float(*v)),
        Value::Str(s) => Some(BusValue::String(s.to_string())),
        _ => None,
    }
}

/// Integers are accepted for float properties; nothing else converts.
fn coerce(value: BusValue, expected: ValueType) -> Option<BusValue> {
    match (value, expected) {
        (BusValue::Int32(v), ValueType::Float) => Some(BusValue::Float(f64::from(v))),
        (v, t) if v.value_type() == t => Some(v),
        _ => None,
    }
}

fn item_changes(value: &BusValue) -> HashMap<&'static str, Value<'static>> {
    HashMap::from([
        ("Value", Value::from(to_variant(value))),
        ("Text", Value::from(value.text())),
    ])
}

struct BusItem {
    path: String,
    service: Arc<ServiceState>,
}

#[dbus_interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[dbus_interface(name = "GetValue")]
    fn get_value(&self) -> zbus::fdo::Result<OwnedValue> {
        self.service
            .value(&self.path)
            .map(|v| to_variant(&v))
            .ok_or_else(|| zbus::fdo::Error::UnknownObject(self.path.clone()))
    }

    #[dbus_interface(name = "GetText")]
    fn get_text(&self) -> String {
        self.service
            .value(&self.path)
            .map(|v| v.text())
            .unwrap_or_default()
    }

    #[dbus_interface(name = "SetValue")]
    async fn set_value(
        &self,
        value: OwnedValue,
        #[zbus(signal_context)] ctxt: SignalContext<'_>,
    ) -> i32 {
        match self.service.accept(&self.path, &value) {
            Some(stored) => {
                debug!("Remote write {} = {}", self.path, stored);
                if let Err(e) = Self::properties_changed(&ctxt, item_changes(&stored)).await {
                    warn!("Failed to signal {}: {}", self.path, e);
                }
                SET_OK
            }
            None => {
                debug!("Rejected remote write to {}", self.path);
                SET_REJECTED
            }
        }
    }

    #[dbus_interface(signal)]
    async fn properties_changed(
        ctxt: &SignalContext<'_>,
        changes: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
}

/// What lives at one object path of a served service.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceObject {
    /// Whole-tree reads.
    Tree,
    /// One property.
    Item(String),
}

/// Objects served for one service, in registration order.
fn service_objects(name: &ServiceName, order: &[String]) -> Vec<(String, ServiceObject)> {
    let mut objects = vec![
        (name.object_path(), ServiceObject::Tree),
        ("/".to_string(), ServiceObject::Tree),
    ];
    objects.extend(
        order
            .iter()
            .map(|path| (path.clone(), ServiceObject::Item(path.clone()))),
    );
    objects
}

/// Whole-tree reads for a service.
struct RootItem {
    service: Arc<ServiceState>,
}

impl RootItem {
    fn collect<T>(&self, f: impl Fn(&BusValue) -> T) -> HashMap<String, T> {
        let values = lock(&self.service.values);
        self.service
            .order
            .iter()
            .filter_map(|path| {
                let value = values.get(path)?;
                Some((path.trim_start_matches('/').to_string(), f(value)))
            })
            .collect()
    }
}

#[dbus_interface(name = "com.victronenergy.BusItem")]
impl RootItem {
    #[dbus_interface(name = "GetValue")]
    fn get_value(&self) -> HashMap<String, OwnedValue> {
        self.collect(to_variant)
    }

    #[dbus_interface(name = "GetText")]
    fn get_text(&self) -> HashMap<String, String> {
        self.collect(BusValue::text)
    }

    #[dbus_interface(name = "GetItems")]
    fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let values = lock(&self.service.values);
        self.service
            .order
            .iter()
            .filter_map(|path| {
                let value = values.get(path)?;
                let item = HashMap::from([
                    ("Value".to_string(), to_variant(value)),
                    (
                        "Text".to_string(),
                        OwnedValue::from(Value::from(value.text())),
                    ),
                ]);
                Some((path.clone(), item))
            })
            .collect()
    }
}

enum Command {
    Changed {
        connection: Connection,
        path: String,
        value: BusValue,
    },
    Release {
        connection: Connection,
        name: ServiceName,
    },
}

struct Served {
    connection: Connection,
    state: Option<Arc<ServiceState>>,
}

/// Venus OS D-Bus transport.
pub struct DbusTransport {
    endpoint: Endpoint,
    services: Mutex<HashMap<ServiceName, Served>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl DbusTransport {
    /// Create the transport and its signal task. Must be called inside a Tokio runtime.
    pub fn new(endpoint: Endpoint) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_commands(rx));
        Self {
            endpoint,
            services: Mutex::new(HashMap::new()),
            commands: tx,
        }
    }

    pub fn system() -> Self {
        Self::new(Endpoint::System)
    }

    pub fn at_address(address: &str) -> Self {
        Self::new(Endpoint::Address(address.to_string()))
    }

    async fn connect(&self) -> Result<Connection> {
        let connection = match &self.endpoint {
            Endpoint::System => Connection::system().await,
            Endpoint::Address(address) => match ConnectionBuilder::address(address.as_str()) {
                Ok(builder) => builder.build().await,
                Err(e) => Err(e),
            },
        };
        connection.map_err(unavailable)
    }

    fn connection(&self, name: &ServiceName) -> Option<Connection> {
        lock(&self.services)
            .get(name)
            .map(|served| served.connection.clone())
    }
}

#[async_trait]
impl BusTransport for DbusTransport {
    async fn probe(&self) -> Result<()> {
        let connection = self.connect().await?;
        debug!(
            "D-Bus reachable, unique name {}",
            connection
                .unique_name()
                .map_or_else(|| "<none>".to_string(), |n| n.to_string())
        );
        Ok(())
    }

    async fn request_name(&self, name: &ServiceName) -> Result<()> {
        let connection = self.connect().await?;
        let reply = connection
            .request_name_with_flags(name.as_str(), RequestNameFlags::DoNotQueue.into())
            .await;
        match reply {
            Ok(RequestNameReply::PrimaryOwner) | Ok(RequestNameReply::AlreadyOwner) => {
                lock(&self.services).insert(
                    name.clone(),
                    Served {
                        connection,
                        state: None,
                    },
                );
                info!("Acquired D-Bus name {}", name);
                Ok(())
            }
            Ok(RequestNameReply::Exists) | Ok(RequestNameReply::InQueue) => {
                Err(BusError::NameInUse(name.to_string()))
            }
            Err(zbus::Error::NameTaken) => Err(BusError::NameInUse(name.to_string())),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn expose(&self, export: ServiceExport) -> Result<()> {
        let connection = {
            let services = lock(&self.services);
            let served = services
                .get(&export.name)
                .ok_or_else(|| BusError::Released(export.name.to_string()))?;
            if served.state.is_some() {
                return Err(BusError::AlreadyExposed(export.name.to_string()));
            }
            served.connection.clone()
        };

        let order: Vec<String> = export.snapshot.iter().map(|(p, _)| p.to_string()).collect();
        let values = export
            .snapshot
            .iter()
            .map(|(p, v)| (p.to_string(), v.clone()))
            .collect();
        let state = Arc::new(ServiceState {
            values: Mutex::new(values),
            order,
            settable: export.settable,
            writes: export.writes,
        });

        let server = connection.object_server();
        for (object_path, object) in service_objects(&export.name, &state.order) {
            let service = state.clone();
            let added = match object {
                ServiceObject::Tree => server.at(object_path.as_str(), RootItem { service }).await,
                ServiceObject::Item(path) => {
                    server
                        .at(object_path.as_str(), BusItem { path, service })
                        .await
                }
            };
            added.map_err(unavailable)?;
        }

        if let Some(served) = lock(&self.services).get_mut(&export.name) {
            served.state = Some(state);
        }
        debug!("Serving {} on D-Bus", export.name);
        Ok(())
    }

    fn emit_changed(&self, name: &ServiceName, path: &str, value: &BusValue) {
        let connection = {
            let services = lock(&self.services);
            let Some(served) = services.get(name) else {
                return;
            };
            if let Some(state) = &served.state {
                lock(&state.values).insert(path.to_string(), value.clone());
            }
            served.connection.clone()
        };
        let _ = self.commands.send(Command::Changed {
            connection,
            path: path.to_string(),
            value: value.clone(),
        });
    }

    fn release_name(&self, name: &ServiceName) {
        let Some(served) = lock(&self.services).remove(name) else {
            return;
        };
        let _ = self.commands.send(Command::Release {
            connection: served.connection,
            name: name.clone(),
        });
    }
}

async fn run_commands(mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Changed {
                connection,
                path,
                value,
            } => {
                let result = match SignalContext::new(&connection, path.as_str()) {
                    Ok(ctxt) => BusItem::properties_changed(&ctxt, item_changes(&value)).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    warn!("Failed to signal {}: {}", path, e);
                }
            }
            Command::Release { connection, name } => {
                match connection.release_name(name.as_str()).await {
                    Ok(_) => info!("Released D-Bus name {}", name),
                    Err(e) => warn!("Failed to release {}: {}", name, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk2venus_core::{FluidType, ServiceIdentity, ServiceNaming};

    fn state(writes: mpsc::UnboundedSender<RemoteWrite>) -> ServiceState {
        ServiceState {
            values: Mutex::new(HashMap::from([
                ("/CustomName".to_string(), BusValue::from("")),
                ("/Level".to_string(), BusValue::Float(0.0)),
            ])),
            order: vec!["/CustomName".to_string(), "/Level".to_string()],
            settable: HashSet::from(["/CustomName".to_string()]),
            writes,
        }
    }

    #[test]
    fn test_tree_served_at_service_object_path() {
        let name = ServiceIdentity::tank(FluidType::Fuel, 0).service_name(&ServiceNaming::default());
        let order = vec!["/Level".to_string(), "/Mgmt/Connection".to_string()];

        let objects = service_objects(&name, &order);
        assert_eq!(
            objects,
            vec![
                (
                    "/com/victronenergy/tank/signalk_0_0".to_string(),
                    ServiceObject::Tree
                ),
                ("/".to_string(), ServiceObject::Tree),
                ("/Level".to_string(), ServiceObject::Item("/Level".to_string())),
                (
                    "/Mgmt/Connection".to_string(),
                    ServiceObject::Item("/Mgmt/Connection".to_string())
                ),
            ]
        );
        assert_eq!(ServiceName::from_object_path(&objects[0].0), Some(name));
    }

    #[test]
    fn test_variant_conversion() {
        assert_eq!(
            from_variant(&Value::from(7i32)),
            Some(BusValue::Int32(7))
        );
        assert_eq!(
            from_variant(&Value::from(1.5f64)),
            Some(BusValue::Float(1.5))
        );
        assert_eq!(
            from_variant(&Value::from("Mast")),
            Some(BusValue::from("Mast"))
        );
        assert_eq!(from_variant(&Value::from(true)), None);
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            coerce(BusValue::Int32(3), ValueType::Float),
            Some(BusValue::Float(3.0))
        );
        assert_eq!(coerce(BusValue::Float(3.0), ValueType::Int32), None);
        assert_eq!(
            coerce(BusValue::from("x"), ValueType::String),
            Some(BusValue::from("x"))
        );
    }

    #[test]
    fn test_accept_respects_settable() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = state(tx);

        assert_eq!(state.accept("/Level", &Value::from(5.0f64)), None);
        assert_eq!(
            state.accept("/CustomName", &Value::from("Bow")),
            Some(BusValue::from("Bow"))
        );
        assert_eq!(state.value("/CustomName"), Some(BusValue::from("Bow")));
        assert_eq!(
            rx.try_recv().unwrap(),
            RemoteWrite {
                path: "/CustomName".to_string(),
                value: BusValue::from("Bow"),
            }
        );
    }

    #[test]
    fn test_accept_without_listener() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let state = state(tx);

        assert_eq!(
            state.accept("/CustomName", &Value::from("Bow")),
            Some(BusValue::from("Bow"))
        );
        assert_eq!(state.value("/CustomName"), Some(BusValue::from("Bow")));
    }
}
