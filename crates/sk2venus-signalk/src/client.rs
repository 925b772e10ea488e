//! Signal K stream client.
//!
//! Connects with `subscribe=none`, subscribes the router's watch patterns and
//! keeps them in sync, and feeds every hello and delta into the router. When
//! the stream drops it reconnects after a fixed delay.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::codec::{decode_server_message, encode_client_message, CodecError};
use crate::messages::{ClientMessage, SubscribeRequest, UnsubscribeRequest};
use crate::router::DeltaRouter;

const STREAM_PATH: &str = "/signalk/v1/stream";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Server closed the stream")]
    Closed,
}

/// Where the Signal K server lives.
///
/// ```json
/// { "url": "ws://localhost:3000", "reconnectSecs": 5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Server base URL or full stream URL.
    pub url: String,

    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

fn default_reconnect_secs() -> u64 {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            reconnect_secs: default_reconnect_secs(),
        }
    }
}

impl ClientConfig {
    /// Full stream URL with no default subscription.
    pub fn stream_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let base = base.split('?').next().unwrap_or(base);
        if base.ends_with(STREAM_PATH) {
            format!("{}?subscribe=none", base)
        } else {
            format!("{}{}?subscribe=none", base, STREAM_PATH)
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }
}

pub struct SignalKClient {
    config: ClientConfig,
    router: Arc<DeltaRouter>,
}

impl SignalKClient {
    pub fn new(config: ClientConfig, router: Arc<DeltaRouter>) -> Self {
        Self { config, router }
    }

    /// Run forever, reconnecting whenever the stream ends.
    pub async fn run(self) {
        let url = self.config.stream_url();
        loop {
            match self.stream_once(&url).await {
                Ok(()) => info!("Signal K stream at {} ended", url),
                Err(e) => warn!("Signal K stream at {} failed: {}", url, e),
            }
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    /// One connection: subscribe, then pump messages until the stream ends.
    pub async fn stream_once(&self, url: &str) -> Result<(), ClientError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        info!("Connected to Signal K at {}", url);
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let mut patterns = self.router.pattern_updates();
        let mut subscribed: BTreeSet<String> = BTreeSet::new();
        let wanted: BTreeSet<String> = patterns.borrow_and_update().iter().cloned().collect();
        for msg in subscription_changes(&subscribed, &wanted) {
            ws_tx.send(Message::Text(encode_client_message(&msg)?)).await?;
        }
        subscribed = wanted;

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match decode_server_message(&text) {
                                Ok(message) => self.router.handle_message(message),
                                Err(e) => debug!("Ignoring message: {}", e),
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            debug!("Ignoring message: {}", CodecError::BinaryFrame);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_tx.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(ClientError::Closed);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        _ => {}
                    }
                }

                changed = patterns.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let wanted: BTreeSet<String> =
                        patterns.borrow_and_update().iter().cloned().collect();
                    for msg in subscription_changes(&subscribed, &wanted) {
                        ws_tx.send(Message::Text(encode_client_message(&msg)?)).await?;
                    }
                    subscribed = wanted;
                }
            }
        }
    }
}

/// Messages that move the server from `current` to `wanted` patterns.
fn subscription_changes(
    current: &BTreeSet<String>,
    wanted: &BTreeSet<String>,
) -> Vec<ClientMessage> {
    let added: Vec<&String> = wanted.difference(current).collect();
    let removed: Vec<&String> = current.difference(wanted).collect();

    let mut messages = Vec::new();
    if !added.is_empty() {
        debug!("Subscribing {:?}", added);
        messages.push(ClientMessage::Subscribe(SubscribeRequest::self_paths(
            added.into_iter().cloned(),
        )));
    }
    if !removed.is_empty() {
        debug!("Unsubscribing {:?}", removed);
        messages.push(ClientMessage::Unsubscribe(UnsubscribeRequest::self_paths(
            removed.into_iter().cloned(),
        )));
    }
    messages
}
