//! Full stack: axum listener, WebSocket upgrade, JSON frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use lobby_api::auth::{AppState, AppStateInner};
use lobby_db::Database;
use lobby_gateway::identity::TokenKeys;
use lobby_gateway::{GatewayConfig, Hub, moderation};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(config: GatewayConfig) -> (SocketAddr, AppState) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let hub = Hub::new(db, TokenKeys::new("test-secret", 1), config);
    let state: AppState = Arc::new(AppStateInner {
        hub,
        admins: Vec::new(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = lobby_server::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn user(state: &AppState, username: &str, is_admin: bool) -> (i64, String) {
    let row = state
        .hub
        .store
        .database()
        .create_user(username, "unused", is_admin)
        .unwrap()
        .unwrap();
    let token = state.hub.tokens.issue(row.id, &row.username).unwrap();
    (row.id, token)
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/gateway")).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next JSON event, or `None` once the server closes the socket.
async fn next_event(ws: &mut Ws) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Skip events until one of type `kind` arrives.
async fn expect(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let event = next_event(ws)
            .await
            .unwrap_or_else(|| panic!("socket closed while waiting for {kind}"));
        if event["type"] == kind {
            return event["data"].clone();
        }
    }
}

async fn authenticate(ws: &mut Ws, token: &str) -> Value {
    send(ws, json!({ "type": "authenticate", "data": { "token": token } })).await;
    expect(ws, "authenticated").await
}

#[tokio::test]
async fn direct_message_round_trip_over_websocket() {
    let (addr, state) = start(GatewayConfig::default()).await;
    let (alice_id, alice_token) = user(&state, "alice", false);
    let (bob_id, bob_token) = user(&state, "bob", false);

    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    // Garbage is ignored; the connection stays usable.
    alice.send(Message::Text("not json".into())).await.unwrap();

    let ack = authenticate(&mut alice, &alice_token).await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["is_admin"], false);
    let roster = expect(&mut alice, "users_list").await;
    assert_eq!(roster["users"].as_array().unwrap().len(), 2);

    authenticate(&mut bob, &bob_token).await;
    let online = expect(&mut alice, "user_online").await;
    assert_eq!(online["id"], bob_id);

    let room = format!("dm:{alice_id}:{bob_id}");
    send(
        &mut alice,
        json!({ "type": "send_message", "data": { "room": room, "content": "hi" } }),
    )
    .await;

    let received = expect(&mut bob, "message").await;
    assert_eq!(received["room"], room);
    assert_eq!(received["content"], "hi");
    assert_eq!(received["sender_id"], alice_id);
    let echoed = expect(&mut alice, "message").await;
    assert_eq!(echoed["id"], received["id"]);

    send(
        &mut bob,
        json!({ "type": "get_messages", "data": { "room": room } }),
    )
    .await;
    let history = expect(&mut bob, "message_history").await;
    assert_eq!(history["messages"].as_array().unwrap().len(), 1);

    send(
        &mut alice,
        json!({ "type": "send_message", "data": { "room": room, "content": "   " } }),
    )
    .await;
    let error = expect(&mut alice, "error").await;
    assert!(error["message"].is_string());

    alice.close(None).await.unwrap();
    let offline = expect(&mut bob, "user_offline").await;
    assert_eq!(offline["id"], alice_id);
}

#[tokio::test]
async fn banned_user_is_disconnected() {
    let (addr, state) = start(GatewayConfig::default()).await;
    let (root_id, _) = user(&state, "root", true);
    let (alice_id, alice_token) = user(&state, "alice", false);

    let mut alice = connect(addr).await;
    authenticate(&mut alice, &alice_token).await;
    expect(&mut alice, "users_list").await;

    assert!(moderation::toggle_ban(&state.hub, root_id, alice_id).await.unwrap());
    expect(&mut alice, "banned").await;
    assert!(next_event(&mut alice).await.is_none(), "socket is closed after ban");

    let mut retry = connect(addr).await;
    let ack = authenticate(&mut retry, &alice_token).await;
    assert_eq!(ack["success"], false);
    expect(&mut retry, "banned").await;
    assert!(next_event(&mut retry).await.is_none());
}

#[tokio::test]
async fn unauthenticated_connection_times_out() {
    let config = GatewayConfig {
        auth_timeout: Duration::from_millis(200),
        ..GatewayConfig::default()
    };
    let (addr, _) = start(config).await;

    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "type": "get_messages", "data": { "room": "general" } })).await;
    assert!(next_event(&mut ws).await.is_none());
}

#[tokio::test]
async fn unresponsive_client_is_dropped_after_missed_pongs() {
    let config = GatewayConfig {
        heartbeat_interval: Duration::from_millis(200),
        ..GatewayConfig::default()
    };
    let (addr, state) = start(config).await;
    let (alice_id, alice_token) = user(&state, "alice", false);
    let (_, bob_token) = user(&state, "bob", false);

    // Pongs are only written while the stream is polled; after this alice
    // goes quiet.
    let mut alice = connect(addr).await;
    authenticate(&mut alice, &alice_token).await;

    let mut bob = connect(addr).await;
    authenticate(&mut bob, &bob_token).await;

    let offline = expect(&mut bob, "user_offline").await;
    assert_eq!(offline["id"], alice_id);
    assert!(!state.hub.dispatcher.online_users().await.contains(&alice_id));

    // Whatever was queued before the drop, the socket ends.
    while next_event(&mut alice).await.is_some() {}
}
