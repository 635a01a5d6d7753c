use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use futures::{SinkExt, StreamExt};
use heallink_server::{configure_routes, AppState, ConnectionRegistry, InMemoryStore, Settings};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(300);

struct TestServer {
    url: Url,
    state: web::Data<AppState>,
}

fn spawn_server(registry: ConnectionRegistry) -> TestServer {
    let config = Settings::new_for_test().expect("Failed to load test config");
    spawn_server_with(registry, config)
}

fn spawn_server_with(registry: ConnectionRegistry, config: Settings) -> TestServer {
    let state = web::Data::new(AppState::from_parts(
        config,
        Arc::new(registry),
        Arc::new(InMemoryStore::new()),
    ));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .listen(listener)
    .unwrap()
    .workers(1)
    .disable_signals()
    .run();
    actix_rt::spawn(server);

    TestServer {
        url: Url::parse(&format!("ws://{}/ws", addr)).unwrap(),
        state,
    }
}

fn scripted_ids(ids: &[&str]) -> impl Fn() -> String + Send + Sync + 'static {
    let ids: Mutex<Vec<String>> = Mutex::new(ids.iter().rev().map(|s| s.to_string()).collect());
    move || ids.lock().unwrap().pop().expect("scripted ids exhausted")
}

async fn connect(server: &TestServer) -> (Client, String) {
    let (mut client, _) = connect_async(server.url.as_str()).await.unwrap();
    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "welcome");
    let id = welcome["userID"].as_str().unwrap().to_string();
    (client, id)
}

/// Next application message, skipping transport frames.
async fn next_json(client: &mut Client) -> Value {
    let deadline = Instant::now() + RECV_TIMEOUT;
    loop {
        let frame = timeout(deadline.saturating_duration_since(Instant::now()), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let deadline = Instant::now() + QUIET_PERIOD;
    while let Ok(frame) = timeout(deadline.saturating_duration_since(Instant::now()), client.next()).await {
        match frame {
            Some(Ok(Message::Text(text))) => panic!("unexpected message: {}", text),
            Some(Ok(_)) => continue,
            other => panic!("connection closed unexpectedly: {:?}", other),
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(20)).await;
    }
}

#[actix_web::test]
async fn test_poke_between_two_clients() {
    let server = spawn_server(ConnectionRegistry::with_id_generator(scripted_ids(&[
        "aaa11111", "bbb22222",
    ])));

    let (mut a, a_id) = connect(&server).await;
    let (mut b, b_id) = connect(&server).await;
    assert_eq!(a_id, "aaa11111");
    assert_eq!(b_id, "bbb22222");

    b.send(Message::Text("aaa11111".to_string())).await.unwrap();

    assert_eq!(next_json(&mut a).await, json!({"type": "poke", "data": "hey"}));
    assert_silent(&mut b).await;
    assert_silent(&mut a).await;
}

#[actix_web::test]
async fn test_unknown_target_keeps_connection_open() {
    let server = spawn_server(ConnectionRegistry::new());

    let (mut a, a_id) = connect(&server).await;
    let (mut b, b_id) = connect(&server).await;

    b.send(Message::Text("zzz99999".to_string())).await.unwrap();
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert!(server.state.registry.contains(&b_id));

    b.send(Message::Text(a_id.clone())).await.unwrap();
    assert_eq!(next_json(&mut a).await["type"], "poke");
}

#[actix_web::test]
async fn test_binary_frames_are_ignored() {
    let server = spawn_server(ConnectionRegistry::new());

    let (mut a, a_id) = connect(&server).await;
    let (mut b, b_id) = connect(&server).await;

    b.send(Message::Binary(a_id.clone().into_bytes())).await.unwrap();
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
    assert!(server.state.registry.contains(&a_id));
    assert!(server.state.registry.contains(&b_id));

    b.send(Message::Text(a_id.clone())).await.unwrap();
    assert_eq!(next_json(&mut a).await, json!({"type": "poke", "data": "hey"}));
}

#[actix_web::test]
async fn test_disconnect_unregisters_and_stops_relaying() {
    let server = spawn_server(ConnectionRegistry::new());

    let (mut a, a_id) = connect(&server).await;
    let (mut b, _b_id) = connect(&server).await;
    assert_eq!(server.state.registry.connection_count(), 2);

    a.close(None).await.unwrap();
    let registry = server.state.registry.clone();
    wait_until(|| !registry.contains(&a_id)).await;

    b.send(Message::Text(a_id.clone())).await.unwrap();
    assert_silent(&mut b).await;
    assert_eq!(server.state.registry.connection_count(), 1);
}

#[actix_web::test]
async fn test_concurrent_connections_get_distinct_ids() {
    const CLIENTS: usize = 20;
    let server = spawn_server(ConnectionRegistry::new());

    let connections = futures::future::join_all((0..CLIENTS).map(|_| connect(&server))).await;

    let ids: HashSet<String> = connections.iter().map(|(_, id)| id.clone()).collect();
    assert_eq!(ids.len(), CLIENTS);
    assert_eq!(server.state.registry.connection_count(), CLIENTS);

    drop(connections);
    let registry = server.state.registry.clone();
    wait_until(|| registry.connection_count() == 0).await;
}

#[actix_web::test]
async fn test_poking_a_leaving_client_is_harmless() {
    let server = spawn_server(ConnectionRegistry::new());

    let (mut a, a_id) = connect(&server).await;
    let (mut b, _b_id) = connect(&server).await;
    let (mut c, c_id) = connect(&server).await;

    for _ in 0..20 {
        b.send(Message::Text(a_id.clone())).await.unwrap();
    }
    a.close(None).await.unwrap();
    for _ in 0..20 {
        b.send(Message::Text(a_id.clone())).await.unwrap();
    }

    let registry = server.state.registry.clone();
    wait_until(|| !registry.contains(&a_id)).await;

    b.send(Message::Text(c_id.clone())).await.unwrap();
    assert_eq!(next_json(&mut c).await, json!({"type": "poke", "data": "hey"}));
    assert_eq!(server.state.registry.connection_count(), 2);
}

fn idle_timeout_config() -> Settings {
    let mut config = Settings::new_for_test().expect("Failed to load test config");
    config.relay.heartbeat_interval_secs = 1;
    config.relay.client_timeout_secs = 2;
    config
}

#[actix_web::test]
async fn test_silent_client_is_pinged_then_closed() {
    let server = spawn_server_with(ConnectionRegistry::new(), idle_timeout_config());

    let (mut client, id) = connect(&server).await;
    let registry = server.state.registry.clone();
    wait_until(|| !registry.contains(&id)).await;

    let mut pinged = false;
    loop {
        let frame = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for the close");
        match frame {
            Some(Ok(Message::Ping(_))) => pinged = true,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(other)) => panic!("unexpected frame: {:?}", other),
        }
    }
    assert!(pinged, "expected a keep-alive ping before the close");
    assert_eq!(server.state.registry.connection_count(), 0);
}

#[actix_web::test]
async fn test_active_client_outlives_idle_timeout() {
    let server = spawn_server_with(ConnectionRegistry::new(), idle_timeout_config());

    let (mut client, id) = connect(&server).await;
    for _ in 0..8 {
        client.send(Message::Text("zzz99999".to_string())).await.unwrap();
        sleep(Duration::from_millis(500)).await;
    }

    assert!(server.state.registry.contains(&id));
    assert_silent(&mut client).await;
}
