//! Stream client against a minimal in-process Signal K server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use sk2venus_core::{EventSource, SourceEvent, ValueSource};
use sk2venus_signalk::{ClientConfig, ClientMessage, DeltaRouter, SignalKClient};

const HELLO: &str = r#"{
    "name": "test-server",
    "version": "1.7.0",
    "self": "vessels.urn:mrn:signalk:uuid:test-vessel",
    "roles": ["main"]
}"#;

const TANK_DELTA: &str = r#"{
    "context": "vessels.urn:mrn:signalk:uuid:test-vessel",
    "updates": [{
        "$source": "test",
        "values": [
            {"path": "tanks.fuel.0.capacity", "value": 200},
            {"path": "tanks.fuel.0.currentLevel", "value": 0.5}
        ]
    }]
}"#;

/// Accept one client, send hello, wait for its subscription, send one delta.
/// Returns the subscription the client sent.
async fn serve_once(listener: TcpListener) -> ClientMessage {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    ws.send(Message::Text(HELLO.to_string())).await.unwrap();

    let subscription = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("Unexpected {:?}", other),
        }
    };

    ws.send(Message::Text(TANK_DELTA.to_string())).await.unwrap();
    // Keep the connection open until the client has read the delta
    tokio::time::sleep(Duration::from_millis(200)).await;
    subscription
}

#[tokio::test]
async fn test_client_subscribes_and_routes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(listener));

    let (tx, mut rx) = mpsc::channel(16);
    let router = Arc::new(DeltaRouter::new(tx));
    router.subscribe("tanks.fuel.0.currentLevel");

    let client = SignalKClient::new(
        ClientConfig {
            url: format!("ws://{}", addr),
            reconnect_secs: 1,
        },
        router.clone(),
    );
    let client_task = tokio::spawn(client.run());

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no event within timeout")
        .unwrap();
    assert_eq!(
        event,
        SourceEvent::new("tanks.fuel.0.currentLevel", serde_json::json!(0.5))
    );
    assert_eq!(
        router.get_self_path("tanks.fuel.0.capacity"),
        Some(serde_json::json!(200))
    );

    match server.await.unwrap() {
        ClientMessage::Subscribe(request) => {
            assert_eq!(request.context, "vessels.self");
            assert_eq!(request.subscribe.len(), 1);
            assert_eq!(request.subscribe[0].path, "tanks.fuel.0.*");
        }
        other => panic!("Expected Subscribe, got {:?}", other),
    }

    client_task.abort();
}
