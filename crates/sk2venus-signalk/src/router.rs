//! Delta routing.
//!
//! The router sits between the stream client and the dispatcher. It keeps
//! the self store current, forwards subscribed paths into the event queue,
//! and tells the client which patterns to ask the server for.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use sk2venus_core::{split_key, EventSource, SourceEvent, SubscriptionId, ValueSource};

use crate::messages::ServerMessage;
use crate::model::Delta;
use crate::store::SelfStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The server-side pattern covering `path` and its siblings.
///
/// `tanks.fuel.0.currentLevel` → `tanks.fuel.0.*`
pub fn watch_pattern(path: &str) -> String {
    match split_key(path) {
        Some((parent, _)) => format!("{}.*", parent),
        None => path.to_string(),
    }
}

pub struct DeltaRouter {
    store: RwLock<SelfStore>,
    subscriptions: Mutex<HashMap<SubscriptionId, String>>,
    next_id: AtomicU64,
    events: mpsc::Sender<SourceEvent>,
    patterns: watch::Sender<Vec<String>>,
    /// Values lost to a full queue since start.
    dropped: AtomicU64,
}

impl DeltaRouter {
    pub fn new(events: mpsc::Sender<SourceEvent>) -> Self {
        let (patterns, _) = watch::channel(Vec::new());
        Self {
            store: RwLock::new(SelfStore::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            patterns,
            dropped: AtomicU64::new(0),
        }
    }

    /// Handle one message from the stream.
    pub fn handle_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Hello(hello) => {
                debug!(
                    "Hello from {} {} (self {})",
                    hello.name.as_deref().unwrap_or("server"),
                    hello.version,
                    hello.self_urn
                );
                self.write_store().set_self_urn(&hello.self_urn);
            }
            ServerMessage::Delta(delta) => {
                self.route_delta(&delta);
            }
        }
    }

    /// Apply a delta and forward subscribed self values. Returns how many were forwarded.
    pub fn route_delta(&self, delta: &Delta) -> usize {
        let applied = self.write_store().apply_delta(delta);
        if applied.is_empty() {
            return 0;
        }

        let subscribed: BTreeSet<String> = lock(&self.subscriptions).values().cloned().collect();
        let mut forwarded = 0;
        for pv in applied {
            if !subscribed.contains(&pv.path) {
                continue;
            }
            match self.events.try_send(SourceEvent::new(pv.path, pv.value)) {
                Ok(()) => forwarded += 1,
                Err(mpsc::error::TrySendError::Full(event)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        "Event queue full, dropped {} = {} ({} dropped so far)",
                        event.path, event.value, dropped
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Event queue closed");
                    return forwarded;
                }
            }
        }
        forwarded
    }

    /// Patterns the stream client should subscribe to, sorted and unique.
    pub fn watch_patterns(&self) -> Vec<String> {
        let patterns: BTreeSet<String> = lock(&self.subscriptions)
            .values()
            .map(|p| watch_pattern(p))
            .collect();
        patterns.into_iter().collect()
    }

    /// Notified whenever the watch patterns change.
    pub fn pattern_updates(&self) -> watch::Receiver<Vec<String>> {
        self.patterns.subscribe()
    }

    /// Values dropped because the event queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    fn write_store(&self) -> std::sync::RwLockWriteGuard<'_, SelfStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_patterns(&self) {
        let patterns = self.watch_patterns();
        self.patterns.send_if_modified(|current| {
            if *current == patterns {
                false
            } else {
                *current = patterns;
                true
            }
        });
    }
}

impl EventSource for DeltaRouter {
    fn subscribe(&self, path: &str) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscriptions).insert(id, path.to_string());
        debug!("Subscribed {} to {}", id, path);
        self.publish_patterns();
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if lock(&self.subscriptions).remove(&id).is_some() {
            debug!("Unsubscribed {}", id);
            self.publish_patterns();
        }
    }
}

impl ValueSource for DeltaRouter {
    fn get_self_path(&self, path: &str) -> Option<Value> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}
