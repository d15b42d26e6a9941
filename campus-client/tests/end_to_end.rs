//! The client against a live SmartCampus server on a loopback port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use campus_api::{create_router, AppState, AuthConfig, CampusStore, EventBus, ServerConfig};
use campus_client::documents;
use campus_client::storage::AUTH_TOKEN_KEY;
use campus_client::{
    CampusClient, ClientConfig, ConnectionState, FetchPolicy, LocalStorage, MemoryTokenStore,
    QueryOptions, ResultSource, WebSocketConfig,
};
use campus_core::{AvailabilityStatus, BroadcastAudience, UserRole};
use futures_util::StreamExt;

const SECRET: &str = "client-e2e-secret-0123456789abcdef";

async fn spawn_server() -> SocketAddr {
    let auth = AuthConfig::with_secret(SECRET).expect("valid secret");
    let state = AppState::new(Arc::new(CampusStore::new()), EventBus::new(64), Arc::new(auth));
    let app = create_router(state, &ServerConfig::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        http_url: format!("http://{}/graphql", addr),
        ws_url: format!("ws://{}/graphql", addr),
        request_timeout_ms: 5_000,
        websocket: WebSocketConfig {
            retry_attempts: 3,
            retry_initial_ms: 50,
            retry_max_ms: 200,
            retry_jitter_ms: 0,
            ..WebSocketConfig::default()
        },
        ..ClientConfig::default()
    }
}

fn memory_client(addr: SocketAddr) -> CampusClient {
    CampusClient::new(&config(addr), Arc::new(MemoryTokenStore::new())).expect("client")
}

/// Register an account and sign the client in with the issued token.
async fn register(client: &CampusClient, email: &str, role: UserRole) -> String {
    let result = client
        .mutate(documents::register("Test User", email, "s3cret-pass", role).expect("document"))
        .await
        .expect("register");
    assert!(result.errors.is_empty(), "register errors: {:?}", result.errors);
    let token = result.data.expect("data")["register"]["token"]
        .as_str()
        .expect("token")
        .to_string();
    client.sign_in(&token).await.expect("sign in");
    token
}

#[tokio::test]
async fn login_token_is_persisted_and_sent() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(addr);
    config.storage_path = dir.path().join("storage.json");

    let client = CampusClient::from_config(&config).expect("client");
    register(&client, "rao@campus.edu", UserRole::Faculty).await;
    client.sign_out().await.expect("sign out");

    let login = client
        .mutate(documents::login("rao@campus.edu", "s3cret-pass").expect("document"))
        .await
        .expect("login");
    let token = login.data.expect("data")["login"]["token"]
        .as_str()
        .expect("token")
        .to_string();
    client.sign_in(&token).await.expect("sign in");

    let stored = LocalStorage::new(&config.storage_path)
        .get_item(AUTH_TOKEN_KEY)
        .await
        .expect("read storage");
    assert_eq!(stored.as_deref(), Some(token.as_str()));

    let me = client.query(documents::me().expect("document")).await.expect("me");
    assert!(me.errors.is_empty(), "me errors: {:?}", me.errors);
    assert_eq!(me.data.expect("data")["me"]["email"], "rao@campus.edu");
}

#[tokio::test]
async fn anonymous_query_gets_field_error_and_public_data() {
    let addr = spawn_server().await;
    let client = memory_client(addr);
    let operation = campus_client::Operation::new("{ me { id } faculties { id name } }")
        .expect("parse");

    let result = client.query(operation).await.expect("partial result");

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path_string(), "me");
    let data = result.data.expect("data");
    assert!(data["me"].is_null());
    assert!(data["faculties"].is_array());
}

#[tokio::test]
async fn cache_first_answers_repeat_queries_locally() {
    let addr = spawn_server().await;
    let faculty = memory_client(addr);
    register(&faculty, "iyer@campus.edu", UserRole::Faculty).await;

    let client = memory_client(addr);
    let first = client
        .query(documents::faculties().expect("document"))
        .await
        .expect("faculties");
    assert_eq!(first.source, ResultSource::Network);
    let faculties = first.data.clone().expect("data")["faculties"].clone();
    assert_eq!(faculties.as_array().map(Vec::len), Some(1));

    let second = client
        .query(documents::faculties().expect("document"))
        .await
        .expect("faculties");
    assert_eq!(second.source, ResultSource::Cache);
    assert_eq!(second.data, first.data);

    let id = faculties[0]["id"].as_str().expect("id");
    assert!(client.cache().read("Faculty", id, "availability").is_some());
}

#[tokio::test]
async fn subscription_delivers_broadcasts_over_websocket() {
    let addr = spawn_server().await;
    let author = memory_client(addr);
    register(&author, "admin-ish@campus.edu", UserRole::Faculty).await;

    let listener = memory_client(addr);
    let mut broadcasts = listener.subscribe(documents::broadcast_created().expect("document"));
    assert_eq!(listener.connection_state(), Some(ConnectionState::Disconnected));

    // The server only sees the subscription once the socket is up; keep
    // publishing until one arrives.
    let publisher = tokio::spawn(async move {
        for attempt in 0..50 {
            let _ = author
                .mutate(
                    documents::create_broadcast(
                        &format!("Exam schedule {}", attempt),
                        "Posted on the notice board",
                        BroadcastAudience::All,
                    )
                    .expect("document"),
                )
                .await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let event = tokio::time::timeout(Duration::from_secs(10), broadcasts.next())
        .await
        .expect("broadcast in time")
        .expect("stream open")
        .expect("payload");
    publisher.abort();

    let broadcast = &event.data.expect("data")["broadcastCreated"];
    assert!(broadcast["title"]
        .as_str()
        .expect("title")
        .starts_with("Exam schedule"));
    let id = broadcast["id"].as_str().expect("id");
    assert_eq!(
        listener.cache().read("Broadcast", id, "title"),
        Some(broadcast["title"].clone())
    );
    assert_eq!(listener.connection_state(), Some(ConnectionState::Connected));
}

#[tokio::test]
async fn availability_events_update_watched_queries() {
    let addr = spawn_server().await;
    let faculty = memory_client(addr);
    register(&faculty, "mehta@campus.edu", UserRole::Faculty).await;

    let student = memory_client(addr);
    let mut watch = student.watch_query_with(
        documents::faculties().expect("document"),
        QueryOptions::default().fetch_policy(FetchPolicy::NetworkOnly),
    );
    let initial = watch.next().await.expect("item").expect("faculties");
    assert_eq!(
        initial.data.expect("data")["faculties"][0]["availability"]["status"],
        "AVAILABLE"
    );

    let events = student.subscribe(documents::availability_updated(None).expect("document"));
    let drain = tokio::spawn(events.for_each(|_| async {}));

    let publisher = tokio::spawn(async move {
        for _ in 0..50 {
            let _ = faculty
                .mutate(
                    documents::update_availability(AvailabilityStatus::Busy, Some("Lab 3"))
                        .expect("document"),
                )
                .await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let updated = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(item) = watch.next().await {
            let item = item.expect("watch result");
            let data = item.data.expect("data");
            if data["faculties"][0]["availability"]["status"] == "BUSY" {
                return data;
            }
        }
        panic!("watch ended");
    })
    .await
    .expect("update in time");
    publisher.abort();
    drain.abort();

    let availability = &updated["faculties"][0]["availability"];
    assert_eq!(availability["note"], "Lab 3");
    // Fields the event did not select survive the shallow merge.
    assert!(availability.get("dateOverrides").is_some());
}
