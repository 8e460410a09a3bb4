use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use label_sender::{
    client::{ClientError, RelayClient},
    poller::poll_commands,
};
use relay_server::{
    build_router,
    cache::InboundCache,
    config::{TopicConfig, DEFAULT_MAX_PAYLOAD_BYTES},
    connector::{ConnectionState, Publisher},
    endpoints::Relay,
    error::RelayError,
};

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<String>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, _topic: &str, payload: &str) -> Result<(), RelayError> {
        self.published.lock().unwrap().push(payload.to_owned());
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

/// Serve a relay on an ephemeral local port.
fn spawn_relay() -> (SocketAddr, Arc<InboundCache>, Arc<RecordingPublisher>) {
    let cache = Arc::new(InboundCache::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let relay = Relay::new(
        Arc::clone(&cache),
        publisher.clone(),
        TopicConfig {
            subscribe: "door/commands".into(),
            publish: "camera/predictions".into(),
        },
        None,
        DEFAULT_MAX_PAYLOAD_BYTES,
    );
    let app = build_router(Arc::new(relay), None);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });

    (addr, cache, publisher)
}

#[tokio::test]
async fn test_send_prediction_round_trip() {
    let (addr, _cache, publisher) = spawn_relay();
    let client = RelayClient::new(&addr.to_string());

    let response = client.send_prediction("mask,no-mask").await.unwrap();
    assert_eq!(response.message, "Message published successfully");
    assert_eq!(response.payload, "mask,no-mask");
    assert_eq!(
        *publisher.published.lock().unwrap(),
        vec!["mask,no-mask".to_owned()]
    );
}

#[tokio::test]
async fn test_empty_prediction_is_rejected() {
    let (addr, _cache, publisher) = spawn_relay();
    let client = RelayClient::new(&addr.to_string());

    match client.send_prediction("").await {
        Err(ClientError::Rejected { status, message }) => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message, "Payload is required");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_command() {
    let (addr, cache, _publisher) = spawn_relay();
    let client = RelayClient::new(&format!("http://{addr}/"));

    assert_eq!(client.latest_command().await.unwrap(), None);

    cache.store("open-door");
    assert_eq!(
        client.latest_command().await.unwrap().as_deref(),
        Some("open-door")
    );
}

#[tokio::test]
async fn test_poller_reports_each_new_command_once() {
    let (addr, cache, _publisher) = spawn_relay();
    let client = RelayClient::new(&addr.to_string());

    cache.store("open-door");
    let later = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cache.store("close-door");
        })
    };

    let mut seen = Vec::new();
    poll_commands(
        &client,
        Duration::from_millis(20),
        tokio::time::sleep(Duration::from_millis(400)),
        |command| seen.push(command.to_owned()),
    )
    .await;
    later.await.unwrap();

    assert_eq!(seen, vec!["open-door", "close-door"]);
}

#[tokio::test]
async fn test_poller_stops_during_stalled_request() {
    // Accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = RelayClient::new(&listener.local_addr().unwrap().to_string());
    let stalled = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let stopped = tokio::time::timeout(
        Duration::from_secs(2),
        poll_commands(
            &client,
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(200)),
            |command| panic!("unexpected command {command}"),
        ),
    )
    .await;
    assert!(stopped.is_ok());
    stalled.abort();
}
