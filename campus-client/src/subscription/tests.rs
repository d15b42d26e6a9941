//! Connection lifecycle tests against a scripted in-process server.

use super::*;
use crate::storage::MemoryTokenStore;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::AtomicU32;
use tokio::sync::oneshot;

/// The server half of a fake connection.
struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<ClientMessage>,
    to_client: mpsc::UnboundedSender<Result<ServerMessage, TransportError>>,
}

impl ServerEnd {
    async fn expect(&mut self) -> ClientMessage {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("client message in time")
            .expect("client still connected")
    }

    /// Accept `connection_init` and return its payload.
    async fn handshake(&mut self) -> serde_json::Value {
        match self.expect().await {
            ClientMessage::ConnectionInit { payload } => {
                self.send(ServerMessage::ConnectionAck { payload: None });
                payload.unwrap_or_default()
            }
            other => panic!("expected connection_init, got {:?}", other),
        }
    }

    async fn expect_subscribe(&mut self) -> String {
        match self.expect().await {
            ClientMessage::Subscribe { id, .. } => id,
            other => panic!("expected subscribe, got {:?}", other),
        }
    }

    fn send(&self, message: ServerMessage) {
        self.to_client.send(Ok(message)).expect("client receiving");
    }
}

struct ChannelTransport {
    to_server: mpsc::UnboundedSender<ClientMessage>,
    from_server: mpsc::UnboundedReceiver<Result<ServerMessage, TransportError>>,
}

#[async_trait]
impl WsTransport for ChannelTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        self.to_server
            .send(message)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        self.from_server.recv().await
    }

    async fn close(&mut self) {
        self.from_server.close();
    }
}

struct FakeConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    attempts: AtomicU32,
    refuse: bool,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn WsTransport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerEnd {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Connect("server gone".to_string()))?;
        Ok(Box::new(ChannelTransport {
            to_server,
            from_server,
        }))
    }
}

fn fast_config() -> WebSocketConfig {
    WebSocketConfig {
        retry_attempts: 3,
        retry_initial_ms: 1,
        retry_max_ms: 5,
        retry_multiplier: 2.0,
        retry_jitter_ms: 0,
        lazy_close_timeout_ms: 0,
        ack_timeout_ms: 1_000,
    }
}

fn setup(
    refuse: bool,
    tokens: Arc<MemoryTokenStore>,
) -> (
    SubscriptionClient,
    Arc<FakeConnector>,
    mpsc::UnboundedReceiver<ServerEnd>,
) {
    let (accepted, connections) = mpsc::unbounded_channel();
    let connector = Arc::new(FakeConnector {
        accepted,
        attempts: AtomicU32::new(0),
        refuse,
    });
    let client = SubscriptionClient::with_connector(
        "ws://campus.test/graphql",
        connector.clone(),
        tokens,
        fast_config(),
    );
    (client, connector, connections)
}

fn broadcasts() -> Operation {
    Operation::new("subscription { broadcastCreated { id title } }").expect("parse")
}

/// Poll `stream` in the background and hand back its first item.
fn first_item(
    mut stream: ResponseStream,
) -> oneshot::Receiver<Option<Result<GraphqlResponse, TransportError>>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tx.send(stream.next().await);
    });
    rx
}

async fn next_connection(connections: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(Duration::from_secs(5), connections.recv())
        .await
        .expect("connection in time")
        .expect("connector alive")
}

async fn wait_for_state(client: &SubscriptionClient, state: ConnectionState) {
    let mut rx = client.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("state reached in time")
        .expect("state channel open");
}

#[tokio::test]
async fn test_connection_is_lazy() {
    let (client, connector, _connections) = setup(false, Arc::new(MemoryTokenStore::new()));

    let stream = client.subscribe(&broadcasts());
    tokio::task::yield_now().await;

    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    drop(stream);
}

#[tokio::test]
async fn test_payloads_delivered_and_params_carry_token() {
    let tokens = Arc::new(MemoryTokenStore::with_token("jwt-a"));
    let (client, _connector, mut connections) = setup(false, tokens);

    let item = first_item(client.subscribe(&broadcasts()));
    let mut server = next_connection(&mut connections).await;
    assert_eq!(
        server.handshake().await,
        json!({ "Authorization": "Bearer jwt-a" })
    );
    let id = server.expect_subscribe().await;
    server.send(ServerMessage::Next {
        id,
        payload: GraphqlResponse::from_data(json!({ "broadcastCreated": { "id": "b1", "title": "Hi" } })),
    });

    let response = item.await.expect("task").expect("item").expect("payload");
    assert_eq!(
        response.data,
        Some(json!({ "broadcastCreated": { "id": "b1", "title": "Hi" } }))
    );
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_reconnect_sends_current_token_and_resubscribes() {
    let tokens = Arc::new(MemoryTokenStore::with_token("first"));
    let (client, connector, mut connections) = setup(false, tokens.clone());

    let item = first_item(client.subscribe(&broadcasts()));
    let mut server = next_connection(&mut connections).await;
    assert_eq!(server.handshake().await["Authorization"], "Bearer first");
    let id = server.expect_subscribe().await;

    // Rotate the token, then drop the connection.
    tokens.save_token("second").await.expect("save");
    drop(server);

    let mut server = next_connection(&mut connections).await;
    assert_eq!(server.handshake().await["Authorization"], "Bearer second");
    assert_eq!(server.expect_subscribe().await, id);
    server.send(ServerMessage::Next {
        id,
        payload: GraphqlResponse::from_data(json!({ "broadcastCreated": { "id": "b2" } })),
    });

    let response = item.await.expect("task").expect("item").expect("payload");
    assert!(response.data.is_some());
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_gives_up_after_retry_bound() {
    let (client, connector, _connections) = setup(true, Arc::new(MemoryTokenStore::new()));

    let mut stream = client.subscribe(&broadcasts());
    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("result in time");

    assert_eq!(first, Some(Err(TransportError::RetriesExhausted { attempts: 4 })));
    assert_eq!(tokio::time::timeout(Duration::from_secs(5), stream.next()).await.expect("end"), None);
    // The first attempt plus three retries.
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_unsubscribe_during_backoff_stops_reconnecting() {
    let (accepted, _connections) = mpsc::unbounded_channel();
    let connector = Arc::new(FakeConnector {
        accepted,
        attempts: AtomicU32::new(0),
        refuse: true,
    });
    let client = SubscriptionClient::with_connector(
        "ws://campus.test/graphql",
        connector.clone(),
        Arc::new(MemoryTokenStore::new()),
        WebSocketConfig {
            retry_attempts: 10,
            retry_initial_ms: 200,
            retry_max_ms: 200,
            ..fast_config()
        },
    );

    let mut stream = client.subscribe(&broadcasts());
    let poll = tokio::spawn(async move {
        let _ = stream.next().await;
    });
    wait_for_state(&client, ConnectionState::Reconnecting).await;

    poll.abort();
    let _ = poll.await;
    wait_for_state(&client, ConnectionState::Disconnected).await;

    let attempts = connector.attempts.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), attempts);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_subscriptions_share_one_connection() {
    let (client, connector, mut connections) = setup(false, Arc::new(MemoryTokenStore::new()));

    let first = first_item(client.subscribe(&broadcasts()));
    let mut server = next_connection(&mut connections).await;
    server.handshake().await;
    let id_a = server.expect_subscribe().await;

    let second = first_item(
        client.subscribe(&Operation::new("subscription { notificationReceived { id } }").expect("parse")),
    );
    let id_b = server.expect_subscribe().await;
    assert_ne!(id_a, id_b);

    server.send(ServerMessage::Next {
        id: id_b.clone(),
        payload: GraphqlResponse::from_data(json!({ "notificationReceived": { "id": "n1" } })),
    });
    server.send(ServerMessage::Next {
        id: id_a.clone(),
        payload: GraphqlResponse::from_data(json!({ "broadcastCreated": { "id": "b1" } })),
    });

    let a = first.await.expect("task").expect("item").expect("payload");
    let b = second.await.expect("task").expect("item").expect("payload");
    assert_eq!(a.data, Some(json!({ "broadcastCreated": { "id": "b1" } })));
    assert_eq!(b.data, Some(json!({ "notificationReceived": { "id": "n1" } })));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropping_last_subscription_completes_and_closes() {
    let (client, _connector, mut connections) = setup(false, Arc::new(MemoryTokenStore::new()));

    let mut stream = client.subscribe(&broadcasts());
    let poll = tokio::spawn(async move {
        // Runs until aborted; the stream is dropped with the task.
        let _ = stream.next().await;
    });
    let mut server = next_connection(&mut connections).await;
    server.handshake().await;
    let id = server.expect_subscribe().await;
    wait_for_state(&client, ConnectionState::Connected).await;

    poll.abort();
    let _ = poll.await;

    assert_eq!(server.expect().await, ClientMessage::Complete { id });
    wait_for_state(&client, ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn test_server_error_ends_subscription_with_errors() {
    let (client, _connector, mut connections) = setup(false, Arc::new(MemoryTokenStore::new()));

    let mut stream = client.subscribe(&broadcasts());
    let collect = tokio::spawn(async move {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    });
    let mut server = next_connection(&mut connections).await;
    server.handshake().await;
    let id = server.expect_subscribe().await;
    server.send(ServerMessage::Error {
        id,
        payload: vec![crate::error::GraphqlError::new("Authentication required")],
    });

    let items = tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("stream ends")
        .expect("task");
    assert_eq!(items.len(), 1);
    let response = items[0].as_ref().expect("graphql payload");
    assert_eq!(response.errors[0].message, "Authentication required");
}

#[test]
fn test_backoff_without_jitter_is_exact() {
    assert_eq!(jittered_backoff(250, 0), 250);
    assert!((250..350).contains(&jittered_backoff(250, 100)));
}
