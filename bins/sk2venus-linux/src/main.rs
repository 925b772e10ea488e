mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, response::Json, routing::get, Router};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sk2venus_bridge::{Bridge, Host, StatusBoard, StatusSummary};
use sk2venus_bus::{BusKind, BusSettings, BusTransport, MemoryBus, ServiceRegistration};
use sk2venus_signalk::{DeltaRouter, SignalKClient};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sk2venus=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    config
        .bridge
        .validate()
        .context("invalid bridge configuration")?;

    tracing::info!(
        "sk2venus {} starting with {} services",
        env!("CARGO_PKG_VERSION"),
        config.bridge.services.len()
    );

    let status = Arc::new(StatusBoard::new());
    let (event_tx, event_rx) = mpsc::channel(config.queue_capacity);
    let router = Arc::new(DeltaRouter::new(event_tx));

    let registration = ServiceRegistration::new(transport(&config.bus)?, config.bridge.naming()?)
        .with_retry(config.bus.retry);
    let host = Host::new(router.clone(), router.clone(), status.clone());

    // Subscriptions are in place before the stream connects
    let mut bridge = Bridge::start(config.bridge.clone(), registration, host, event_rx)
        .await
        .context("failed to start the bridge")?;

    let client = SignalKClient::new(config.signalk.clone(), router.clone());
    let client_handle = tokio::spawn(client.run());

    let http_handle = config.http.as_ref().map(|http| {
        let addr = http.bind;
        let status = status.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(addr, status).await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });

    tracing::info!("Bridging Signal K at {}", config.signalk.stream_url());

    bridge.run(shutdown_signal()).await;

    client_handle.abort();
    if let Some(handle) = http_handle {
        handle.abort();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn transport(settings: &BusSettings) -> anyhow::Result<Arc<dyn BusTransport>> {
    match settings.kind {
        BusKind::Memory => {
            tracing::warn!("Using the in-memory bus; services are not visible outside this process");
            Ok(Arc::new(MemoryBus::new()))
        }
        #[cfg(feature = "dbus")]
        BusKind::System => Ok(Arc::new(sk2venus_bus::DbusTransport::system())),
        #[cfg(feature = "dbus")]
        BusKind::Address => {
            let address = settings
                .address
                .as_deref()
                .context("bus.address is required when bus.kind is \"address\"")?;
            Ok(Arc::new(sk2venus_bus::DbusTransport::at_address(address)))
        }
        #[cfg(not(feature = "dbus"))]
        kind => anyhow::bail!("bus kind {:?} needs the dbus feature", kind),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Received shutdown signal, stopping...");
}

/// Serve the status API.
async fn start_http_server(addr: SocketAddr, status: Arc<StatusBoard>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/sk2venus/v1/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(status);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status API listening on http://{}/sk2venus/v1/status", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn status_handler(State(status): State<Arc<StatusBoard>>) -> Json<StatusSummary> {
    Json(status.summary())
}
