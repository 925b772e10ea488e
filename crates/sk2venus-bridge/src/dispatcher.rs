//! Update dispatch.
//!
//! The dispatcher binds each active service to the Signal K path of its
//! trigger key. Every event on that path runs through the service's adapter
//! and the resulting writes go to the service's property tree, which
//! publishes what changed.
//!
//! The first event of a binding primes the adapter: each static key is read
//! from the value source and applied before the trigger, so derived state
//! (a tank's capacity) is in place for the first publish. Priming is done
//! once and never repeated.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use sk2venus_bus::RegistrationHandle;
use sk2venus_core::{
    join_path, DeviceAdapter, EventSource, PropertyWrite, SourceEvent, StatusSink,
    SubscriptionId, ValueSource,
};

use crate::error::{BridgeError, Result};

/// The host collaborators the dispatcher works against.
#[derive(Clone)]
pub struct Host {
    pub events: Arc<dyn EventSource>,
    pub values: Arc<dyn ValueSource>,
    pub status: Arc<dyn StatusSink>,
}

impl Host {
    pub fn new(
        events: Arc<dyn EventSource>,
        values: Arc<dyn ValueSource>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            events,
            values,
            status,
        }
    }
}

struct Binding {
    base: String,
    adapter: DeviceAdapter,
    handle: RegistrationHandle,
    subscription: SubscriptionId,
    primed: bool,
}

impl Binding {
    /// Apply every static key that currently has a value.
    fn prime(&mut self, values: &dyn ValueSource, status: &dyn StatusSink) {
        let keys: Vec<String> = self
            .adapter
            .static_keys()
            .into_iter()
            .map(str::to_string)
            .collect();

        for key in keys {
            let path = join_path(&self.base, &key);
            let Some(value) = values.get_self_path(&path) else {
                debug!("No value for {} yet, skipping", path);
                continue;
            };
            let result = self
                .adapter
                .apply(&key, &value)
                .map_err(BridgeError::from)
                .and_then(|writes| self.publish(writes));
            if let Err(e) = result {
                status.error(&format!("Priming {} from {} failed: {}", self.handle.name(), path, e));
            }
        }
    }

    /// Write each value and publish the ones that changed.
    fn publish(&mut self, writes: Vec<PropertyWrite>) -> Result<usize> {
        let mut published = 0;
        for write in writes {
            if self.handle.write(&write.path, write.value)? {
                published += 1;
            }
        }
        Ok(published)
    }

    fn teardown(mut self, events: &dyn EventSource) {
        events.unsubscribe(self.subscription);
        self.adapter.stop();
        self.handle.release();
    }
}

pub struct UpdateDispatcher {
    host: Host,
    /// Keyed by the full trigger path.
    bindings: HashMap<String, Binding>,
}

impl UpdateDispatcher {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            bindings: HashMap::new(),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Bind a registered service to `base` and subscribe its trigger path.
    ///
    /// The adapter must already be registered and its tree exposed through
    /// `handle`.
    pub fn subscribe(
        &mut self,
        base: &str,
        adapter: DeviceAdapter,
        handle: RegistrationHandle,
    ) -> Result<SubscriptionId> {
        let path = join_path(base, adapter.trigger_key());
        if self.bindings.contains_key(&path) {
            return Err(BridgeError::Config(format!("{} is already bound", path)));
        }

        let subscription = self.host.events.subscribe(&path);
        debug!("Bound {} to {} ({})", handle.name(), path, subscription);
        self.bindings.insert(
            path,
            Binding {
                base: base.to_string(),
                adapter,
                handle,
                subscription,
                primed: false,
            },
        );
        Ok(subscription)
    }

    /// Process one event. Returns how many properties were published.
    pub fn dispatch(&mut self, event: &SourceEvent) -> Result<usize> {
        let binding = self
            .bindings
            .get_mut(&event.path)
            .ok_or_else(|| BridgeError::UnboundPath(event.path.clone()))?;

        binding.handle.sync_remote_writes()?;

        if !binding.primed {
            binding.primed = true;
            binding.prime(self.host.values.as_ref(), self.host.status.as_ref());
        }

        let key = binding.adapter.trigger_key();
        let writes = binding.adapter.apply(key, &event.value)?;
        binding.publish(writes)
    }

    /// Process one event, reporting a failure to the status sink.
    pub fn handle(&mut self, event: &SourceEvent) -> Option<usize> {
        match self.dispatch(event) {
            Ok(published) => Some(published),
            Err(e) => {
                self.host
                    .status
                    .error(&format!("Dropped update for {}: {}", event.path, e));
                None
            }
        }
    }

    /// Tear down the binding for a base path or trigger path.
    ///
    /// Returns `false` if nothing was bound there.
    pub fn unsubscribe(&mut self, path: &str) -> bool {
        let key = if self.bindings.contains_key(path) {
            Some(path.to_string())
        } else {
            self.bindings
                .iter()
                .find(|(_, b)| b.base == path)
                .map(|(k, _)| k.clone())
        };

        match key.and_then(|k| self.bindings.remove(&k)) {
            Some(binding) => {
                debug!("Unbinding {}", binding.handle.name());
                binding.teardown(self.host.events.as_ref());
                true
            }
            None => false,
        }
    }

    /// Tear down every binding. Returns how many there were.
    pub fn unsubscribe_all(&mut self) -> usize {
        let count = self.bindings.len();
        for (_, binding) in self.bindings.drain() {
            binding.teardown(self.host.events.as_ref());
        }
        count
    }

    /// Bound trigger paths, sorted.
    pub fn bound_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.bindings.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusBoard;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use sk2venus_bus::{MemoryBus, ServiceRegistration};
    use sk2venus_core::{BusValue, ManagementInfo, ServiceIdentity, ServiceName, ServiceNaming};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        values: Mutex<HashMap<String, Value>>,
        subscribed: Mutex<Vec<String>>,
        unsubscribed: Mutex<Vec<SubscriptionId>>,
    }

    impl EventSource for FakeSource {
        fn subscribe(&self, path: &str) -> SubscriptionId {
            let mut subscribed = self.subscribed.lock().unwrap();
            subscribed.push(path.to_string());
            SubscriptionId(subscribed.len() as u64)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.unsubscribed.lock().unwrap().push(id);
        }
    }

    impl ValueSource for FakeSource {
        fn get_self_path(&self, path: &str) -> Option<Value> {
            self.values.lock().unwrap().get(path).cloned()
        }
    }

    struct Fixture {
        bus: MemoryBus,
        source: Arc<FakeSource>,
        status: Arc<StatusBoard>,
        dispatcher: UpdateDispatcher,
    }

    fn fixture() -> Fixture {
        let bus = MemoryBus::new();
        let source = Arc::new(FakeSource::default());
        let status = Arc::new(StatusBoard::new());
        let host = Host::new(source.clone(), source.clone(), status.clone());
        Fixture {
            bus,
            source,
            status,
            dispatcher: UpdateDispatcher::new(host),
        }
    }

    async fn bind_tank(fx: &mut Fixture, base: &str) {
        let registration =
            ServiceRegistration::new(Arc::new(fx.bus.clone()), ServiceNaming::default());
        let mut adapter = DeviceAdapter::tank(
            ServiceIdentity::from_tank_path(base).unwrap(),
            &ManagementInfo::default(),
            None,
            1.0,
            100.0,
        );
        let tree = adapter.declare_schema().unwrap();
        let mut handle = registration.register(adapter.identity()).await.unwrap();
        handle
            .expose_tree(tree, adapter.settable_paths())
            .await
            .unwrap();
        adapter.mark_registered().unwrap();
        fx.dispatcher.subscribe(base, adapter, handle).unwrap();
    }

    fn tank_name(base: &str) -> ServiceName {
        ServiceIdentity::from_tank_path(base)
            .unwrap()
            .service_name(&ServiceNaming::default())
    }

    #[tokio::test]
    async fn test_subscribes_trigger_path() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;
        assert_eq!(
            *fx.source.subscribed.lock().unwrap(),
            vec!["tanks.fuel.0.currentLevel"]
        );
        assert_eq!(fx.dispatcher.bound_paths(), vec!["tanks.fuel.0.currentLevel"]);
    }

    #[tokio::test]
    async fn test_primes_before_first_trigger() {
        let mut fx = fixture();
        fx.source
            .values
            .lock()
            .unwrap()
            .insert("tanks.fuel.0.capacity".to_string(), json!(0.2));
        bind_tank(&mut fx, "tanks.fuel.0").await;
        let tank = tank_name("tanks.fuel.0");

        let event = SourceEvent::new("tanks.fuel.0.currentLevel", json!(0.5));
        assert!(fx.dispatcher.dispatch(&event).unwrap() > 0);
        assert_eq!(fx.bus.value(&tank, "/Capacity"), Some(BusValue::Float(0.2)));
        assert_eq!(fx.bus.value(&tank, "/Remaining"), Some(BusValue::Float(0.1)));
        assert_eq!(fx.bus.value(&tank, "/Level"), Some(BusValue::Float(50.0)));
    }

    #[tokio::test]
    async fn test_primes_only_once() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;
        let tank = tank_name("tanks.fuel.0");

        // No capacity known at the first event
        let event = SourceEvent::new("tanks.fuel.0.currentLevel", json!(0.5));
        fx.dispatcher.dispatch(&event).unwrap();
        assert_eq!(fx.bus.value(&tank, "/Remaining"), Some(BusValue::Float(0.0)));

        // A capacity showing up later is not picked up by lookup again
        fx.source
            .values
            .lock()
            .unwrap()
            .insert("tanks.fuel.0.capacity".to_string(), json!(0.2));
        let event = SourceEvent::new("tanks.fuel.0.currentLevel", json!(0.6));
        fx.dispatcher.dispatch(&event).unwrap();
        assert_eq!(fx.bus.value(&tank, "/Remaining"), Some(BusValue::Float(0.0)));
        assert_eq!(fx.bus.value(&tank, "/Level"), Some(BusValue::Float(60.0)));
    }

    #[tokio::test]
    async fn test_unchanged_values_are_not_republished() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;
        let tank = tank_name("tanks.fuel.0");
        let event = SourceEvent::new("tanks.fuel.0.currentLevel", json!(0.5));
        fx.dispatcher.dispatch(&event).unwrap();
        assert_eq!(fx.dispatcher.dispatch(&event).unwrap(), 0);
        assert_eq!(fx.bus.signals_for(&tank, "/Level").len(), 1);
    }

    #[tokio::test]
    async fn test_failures_reported_once() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;

        assert_eq!(
            fx.dispatcher
                .handle(&SourceEvent::new("tanks.fuel.1.currentLevel", json!(0.5))),
            None
        );
        assert_eq!(
            fx.dispatcher
                .handle(&SourceEvent::new("tanks.fuel.0.currentLevel", json!("half"))),
            None
        );
        assert_eq!(fx.status.error_count(), 2);
        assert!(fx.status.errors()[0].contains("tanks.fuel.1.currentLevel"));
    }

    #[tokio::test]
    async fn test_duplicate_binding_rejected() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;

        let adapter = DeviceAdapter::temperature(
            ServiceIdentity::temperature(0),
            &ManagementInfo::default(),
            None,
        );
        let registration =
            ServiceRegistration::new(Arc::new(fx.bus.clone()), ServiceNaming::default());
        let handle = registration.register(adapter.identity()).await.unwrap();
        fx.dispatcher
            .subscribe("environment.inside", adapter.clone(), handle)
            .unwrap();

        let handle = registration
            .register(&ServiceIdentity::temperature(1))
            .await
            .unwrap();
        assert!(matches!(
            fx.dispatcher.subscribe("environment.inside", adapter, handle),
            Err(BridgeError::Config(_))
        ));
        // The rejected handle was dropped and gave its name back
        let rejected = ServiceIdentity::temperature(1).service_name(&ServiceNaming::default());
        assert!(!fx.bus.owns(&rejected));
    }

    #[tokio::test]
    async fn test_unsubscribe_one() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;
        bind_tank(&mut fx, "tanks.freshWater.1").await;

        assert!(fx.dispatcher.unsubscribe("tanks.fuel.0"));
        assert!(!fx.dispatcher.unsubscribe("tanks.fuel.0"));
        assert!(!fx.bus.owns(&tank_name("tanks.fuel.0")));
        assert!(fx.bus.owns(&tank_name("tanks.freshWater.1")));
        assert_eq!(fx.source.unsubscribed.lock().unwrap().len(), 1);

        let event = SourceEvent::new("tanks.freshWater.1.currentLevel", json!(0.5));
        assert!(fx.dispatcher.dispatch(&event).is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_all_is_idempotent() {
        let mut fx = fixture();
        bind_tank(&mut fx, "tanks.fuel.0").await;
        bind_tank(&mut fx, "tanks.freshWater.1").await;

        assert_eq!(fx.dispatcher.unsubscribe_all(), 2);
        assert_eq!(fx.dispatcher.unsubscribe_all(), 0);
        assert!(fx.dispatcher.is_empty());
        assert!(fx.bus.owned_names().is_empty());
        assert_eq!(fx.source.unsubscribed.lock().unwrap().len(), 2);

        let event = SourceEvent::new("tanks.fuel.0.currentLevel", json!(0.5));
        assert_eq!(
            fx.dispatcher.dispatch(&event),
            Err(BridgeError::UnboundPath(
                "tanks.fuel.0.currentLevel".to_string()
            ))
        );
    }
}
