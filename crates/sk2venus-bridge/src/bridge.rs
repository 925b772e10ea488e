//! Bridge lifecycle.
//!
//! [`Bridge::start`] brings up every configured service; each one is built,
//! registered, exposed and bound on its own, and a failure is reported
//! without affecting the rest. Only an unreachable bus stops startup.
//! [`Bridge::run`] then drains the event queue until shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use sk2venus_bus::ServiceRegistration;
use sk2venus_core::{ServiceDescriptor, SourceEvent, StatusSink};

use crate::config::BridgeConfig;
use crate::dispatcher::{Host, UpdateDispatcher};
use crate::error::Result;

pub struct Bridge {
    config: BridgeConfig,
    registration: ServiceRegistration,
    dispatcher: UpdateDispatcher,
    status: Arc<dyn StatusSink>,
    events: mpsc::Receiver<SourceEvent>,
    stopped: bool,
}

impl Bridge {
    /// Start every configured service.
    ///
    /// Fails only if the bus cannot be reached at all.
    pub async fn start(
        config: BridgeConfig,
        registration: ServiceRegistration,
        host: Host,
        events: mpsc::Receiver<SourceEvent>,
    ) -> Result<Self> {
        registration.probe().await?;

        let status = host.status.clone();
        let mut bridge = Self {
            config,
            registration,
            dispatcher: UpdateDispatcher::new(host),
            status,
            events,
            stopped: false,
        };

        let services = bridge.config.services.clone();
        for descriptor in &services {
            if let Err(e) = bridge.activate(descriptor).await {
                bridge.status.error(&format!(
                    "Failed to start {} service for {}: {}",
                    descriptor.class, descriptor.path, e
                ));
            }
        }

        bridge.status.status(&format!(
            "Bridging {} of {} services",
            bridge.dispatcher.len(),
            services.len()
        ));
        Ok(bridge)
    }

    async fn activate(&mut self, descriptor: &ServiceDescriptor) -> Result<()> {
        let mut adapter = descriptor.build_adapter(&self.config.management)?;
        let tree = adapter.declare_schema()?;
        let mut handle = self.registration.register(adapter.identity()).await?;
        handle.expose_tree(tree, adapter.settable_paths()).await?;
        adapter.mark_registered()?;
        debug!("Activated {} for {}", adapter.identity(), descriptor.path);
        self.dispatcher.subscribe(&descriptor.path, adapter, handle)?;
        Ok(())
    }

    pub fn dispatcher(&self) -> &UpdateDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut UpdateDispatcher {
        &mut self.dispatcher
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Handle everything already queued. Returns how many events were taken.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events.try_recv() {
            self.dispatcher.handle(&event);
            processed += 1;
        }
        processed
    }

    /// Handle events until `shutdown` resolves or the queue closes, then stop.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            self.dispatcher.handle(&event);
                        }
                        None => {
                            info!("Event queue closed");
                            break;
                        }
                    }
                }
            }
        }
        self.stop();
    }

    /// Unbind every service and release its name. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        let count = self.dispatcher.unsubscribe_all();
        self.events.close();
        self.status
            .status(&format!("Stopped, released {} services", count));
        true
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
