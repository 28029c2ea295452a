//! Live feed consumer against an in-process websocket server

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use parking_lot::Mutex;
use pattern_client::auth::{AuthContext, StaticTokenSource};
use pattern_client::stream::{
    ConnectionState, StreamConsumer, StreamConsumerConfig, StreamRecord, WebSocketTransport,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct FeedServer {
    tokens: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

async fn feed(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<FeedServer>>,
) -> Response {
    state
        .tokens
        .lock()
        .push(params.get("token").cloned().unwrap_or_default());
    let connection = state.connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| serve_feed(socket, connection))
}

/// First connection sends a burst and hangs up; later ones stay open
async fn serve_feed(mut socket: WebSocket, connection: usize) {
    if connection == 0 {
        for seq in 1..=3 {
            let frame = format!(r#"{{"seq": {}, "Port": 443, "anomaly": {}}}"#, seq, seq % 2);
            if socket.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        let _ = socket.send(Message::Text("not json".into())).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(_)) = socket.recv().await {}
}

async fn spawn_server() -> (String, Arc<FeedServer>) {
    let state = Arc::new(FeedServer::default());
    let app = Router::new()
        .route("/ws/stream", get(feed))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}", addr), state)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn seq(record: &StreamRecord) -> u64 {
    record.get("seq").and_then(|v| v.as_u64()).unwrap()
}

fn config(ws_base: String) -> StreamConsumerConfig {
    StreamConsumerConfig {
        ws_base,
        reconnect_delay: Duration::from_millis(200),
        ..StreamConsumerConfig::default()
    }
}

#[tokio::test]
async fn test_consumer_survives_server_hangup() {
    let (ws_base, server) = spawn_server().await;

    let consumer = StreamConsumer::new(config(ws_base), Arc::new(WebSocketTransport::new()));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    consumer.on_record(move |record| sink.lock().push(seq(record)));

    let auth = AuthContext::new(Arc::new(StaticTokenSource::new("secret")));
    let _session = auth.subscribe();
    let handle = consumer.connect(Arc::new(auth.clone()));

    wait_for(|| handle.window().len() == 3).await;
    wait_for(|| handle.stats().malformed_frames == 1).await;
    let window: Vec<u64> = handle.window().iter().map(seq).collect();
    assert_eq!(window, vec![3, 2, 1]);

    // The burst collapses into a dispatch of the newest record
    wait_for(|| !delivered.lock().is_empty()).await;
    assert_eq!(delivered.lock().last(), Some(&3));

    // Server hung up: one reconnect with a freshly fetched token
    wait_for(|| server.connections.load(Ordering::SeqCst) == 2).await;
    wait_for(|| handle.state() == ConnectionState::Connected).await;
    assert_eq!(*server.tokens.lock(), vec!["secret", "secret"]);
    assert_eq!(handle.stats().reconnects_scheduled, 1);

    let summary = handle.summary(10);
    assert_eq!(summary.considered, 3);
    assert_eq!(summary.anomalies, 2);

    handle.close().await;
    assert_eq!(handle.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_anonymous_consumer_sends_empty_token() {
    let (ws_base, server) = spawn_server().await;

    let consumer = StreamConsumer::new(config(ws_base), Arc::new(WebSocketTransport::new()));
    let handle = consumer.connect(Arc::new(AuthContext::anonymous()));

    wait_for(|| handle.window().len() == 3).await;
    assert_eq!(server.tokens.lock().first().map(String::as_str), Some(""));

    handle.close().await;
}

#[tokio::test]
async fn test_unreachable_server_keeps_retrying_until_closed() {
    // Bind and drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let consumer = StreamConsumer::new(
        config(format!("ws://{}", addr)),
        Arc::new(WebSocketTransport::new()),
    );
    let handle = consumer.connect(Arc::new(AuthContext::anonymous()));

    wait_for(|| handle.stats().connection_attempts >= 2).await;
    assert!(matches!(
        handle.state(),
        ConnectionState::Reconnecting { .. } | ConnectionState::Connecting
    ));

    handle.close().await;
    let attempts = handle.stats().connection_attempts;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.stats().connection_attempts, attempts);
}
