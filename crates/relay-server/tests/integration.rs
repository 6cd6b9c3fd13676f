//! End-to-end integration tests using real `WebSocket` and HTTP clients.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a test server on an ephemeral port.
async fn boot_server() -> (SocketAddr, Arc<RelayServer>) {
    boot_server_with(ServerConfig::default()).await
}

async fn boot_server_with(config: ServerConfig) -> (SocketAddr, Arc<RelayServer>) {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(RelayServer::new(config, metrics_handle));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn connect(addr: SocketAddr, path: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    ws
}

/// Connect to `/ws/text` and return the stream plus the assigned ID.
async fn connect_text(addr: SocketAddr) -> (WsStream, String) {
    let mut ws = connect(addr, "/ws/text").await;
    // another client's join notice may land before our welcome
    let welcome = loop {
        let notice = read_json(&mut ws).await;
        if notice["type"] == "system" {
            break notice;
        }
    };
    let id = welcome["clientId"].as_str().unwrap().to_owned();
    (ws, id)
}

/// Next data frame, skipping control frames.
async fn next_data(ws: &mut WsStream) -> Message {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if matches!(msg, Message::Text(_) | Message::Binary(_) | Message::Close(_)) {
            return msg;
        }
    }
}

async fn read_text(ws: &mut WsStream) -> String {
    match next_data(ws).await {
        Message::Text(text) => text.as_str().to_owned(),
        other => panic!("expected text, got {other:?}"),
    }
}

async fn read_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&read_text(ws).await).unwrap()
}

/// Read text frames until one that is not a server notification.
async fn read_relayed_text(ws: &mut WsStream) -> String {
    loop {
        let text = read_text(ws).await;
        match serde_json::from_str::<Value>(&text) {
            Ok(v) if v["type"] == "notification" || v["type"] == "system" => {}
            _ => return text,
        }
    }
}

async fn read_binary(ws: &mut WsStream) -> Vec<u8> {
    match next_data(ws).await {
        Message::Binary(data) => data.to_vec(),
        other => panic!("expected binary, got {other:?}"),
    }
}

/// Assert no data frame other than notifications arrives within `QUIET`.
async fn assert_no_relay(ws: &mut WsStream) {
    let deadline = tokio::time::Instant::now() + QUIET;
    while let Ok(Some(Ok(msg))) = tokio::time::timeout_at(deadline, ws.next()).await {
        match msg {
            Message::Text(text) => {
                let v: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                assert!(
                    v["type"] == "notification",
                    "unexpected text frame: {text}"
                );
            }
            Message::Binary(data) => panic!("unexpected binary frame of {} bytes", data.len()),
            _ => {}
        }
    }
}

async fn wait_for_count(server: &RelayServer, expected: usize) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while server.relay().registry().len() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "registry size stuck at {} (expected {expected})",
            server.relay().registry().len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

// ── Text broadcast ──

#[tokio::test]
async fn e2e_welcome_and_join_notification() {
    let (addr, _server) = boot_server().await;
    let mut ws = connect(addr, "/ws/text").await;

    let welcome = read_json(&mut ws).await;
    assert_eq!(welcome["type"], "system");
    let id = welcome["clientId"].as_str().unwrap();
    assert!(id.starts_with("conn_"));
    assert!(welcome["message"].as_str().unwrap().ends_with(id));

    let join = read_json(&mut ws).await;
    assert_eq!(join["type"], "notification");
    assert_eq!(join["message"], "New user joined. Total users: 1");
}

#[tokio::test]
async fn e2e_broadcast_excludes_sender() {
    let (addr, _server) = boot_server().await;
    let (mut a, _) = connect_text(addr).await;
    let (mut b, _) = connect_text(addr).await;
    let (mut c, _) = connect_text(addr).await;

    c.send(Message::text("hi")).await.unwrap();

    assert_eq!(read_relayed_text(&mut a).await, "hi");
    assert_eq!(read_relayed_text(&mut b).await, "hi");
    assert_no_relay(&mut c).await;
}

#[tokio::test]
async fn e2e_later_joiner_is_announced_to_everyone() {
    let (addr, _server) = boot_server().await;
    let (mut a, _) = connect_text(addr).await;
    let first = read_json(&mut a).await;
    assert_eq!(first["message"], "New user joined. Total users: 1");

    let (_b, _) = connect_text(addr).await;

    let second = read_json(&mut a).await;
    assert_eq!(second["message"], "New user joined. Total users: 2");
}

// ── Targeted delivery ──

#[tokio::test]
async fn e2e_targeted_delivery() {
    let (addr, _server) = boot_server().await;
    let (mut b, b_id) = connect_text(addr).await;
    let mut a = connect(addr, &format!("/ws/text/{b_id}")).await;
    assert_eq!(read_json(&mut a).await["type"], "system");

    a.send(Message::text("psst")).await.unwrap();

    assert_eq!(read_relayed_text(&mut b).await, "psst");
    assert_no_relay(&mut a).await;
}

#[tokio::test]
async fn e2e_targeted_missing_recipient() {
    let (addr, server) = boot_server().await;
    let mut a = connect(addr, "/ws/text/b1").await;
    assert_eq!(read_json(&mut a).await["type"], "system");

    a.send(Message::text("hello")).await.unwrap();

    let notice = read_json(&mut a).await;
    assert_eq!(notice["type"], "error");
    assert_eq!(notice["code"], "CONNECTION_NOT_FOUND");
    assert_eq!(notice["target"], "b1");

    // sender stays connected and can try again
    a.send(Message::text("again")).await.unwrap();
    assert_eq!(read_json(&mut a).await["code"], "CONNECTION_NOT_FOUND");
    assert_eq!(server.relay().registry().len(), 1);
}

// ── Image relay ──

#[tokio::test]
async fn e2e_image_downscaled_for_all_including_sender() {
    let (addr, server) = boot_server().await;
    let mut x = connect(addr, "/ws/image").await;
    let mut y = connect(addr, "/ws/image").await;
    let (mut t, _) = connect_text(addr).await;
    wait_for_count(&server, 3).await;

    x.send(Message::binary(png(1920, 1080))).await.unwrap();

    for ws in [&mut x, &mut y] {
        let jpeg = read_binary(ws).await;
        let img = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (800, 450));
    }
    assert_no_relay(&mut t).await;
}

#[tokio::test]
async fn e2e_bad_image_dropped_sender_survives() {
    let (addr, server) = boot_server().await;
    let mut x = connect(addr, "/ws/image").await;
    wait_for_count(&server, 1).await;

    x.send(Message::binary(b"not an image".to_vec())).await.unwrap();
    x.send(Message::binary(png(32, 32))).await.unwrap();

    let jpeg = read_binary(&mut x).await;
    let img = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
    assert_eq!(server.relay().registry().len(), 1);
}

// ── HTTP injection ──

#[tokio::test]
async fn e2e_http_text_broadcast() {
    let (addr, _server) = boot_server().await;
    let (mut a, _) = connect_text(addr).await;
    let (mut b, _) = connect_text(addr).await;

    let resp: Value = reqwest::Client::new()
        .post(format!("http://{addr}/broadcast/text"))
        .query(&[("message", "server says hi")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["status"], "message broadcasted");
    assert_eq!(resp["recipients"], 2);
    for ws in [&mut a, &mut b] {
        let notice: Value = serde_json::from_str(&read_relayed_text(ws).await).unwrap();
        assert_eq!(notice["type"], "broadcast");
        assert_eq!(notice["from"], "server");
        assert_eq!(notice["content"], "server says hi");
    }
}

#[tokio::test]
async fn e2e_http_image_broadcast_is_passthrough() {
    let (addr, server) = boot_server().await;
    let mut x = connect(addr, "/ws/image").await;
    wait_for_count(&server, 1).await;
    let payload = png(1920, 1080);

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(payload.clone()).file_name("frame.png"),
    );
    let resp: Value = reqwest::Client::new()
        .post(format!("http://{addr}/broadcast/image"))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["status"], "image broadcasted");
    assert_eq!(resp["filename"], "frame.png");
    assert_eq!(resp["recipients"], 1);
    assert_eq!(read_binary(&mut x).await, payload);
}

// ── Lifecycle ──

#[tokio::test]
async fn e2e_client_close_unregisters() {
    let (addr, server) = boot_server().await;
    let (mut a, _) = connect_text(addr).await;
    let (_b, _) = connect_text(addr).await;
    wait_for_count(&server, 2).await;

    a.close(None).await.unwrap();

    wait_for_count(&server, 1).await;
}

#[tokio::test]
async fn e2e_admin_close() {
    let (addr, server) = boot_server().await;
    let (mut a, a_id) = connect_text(addr).await;
    let client = reqwest::Client::new();

    let resp = client
        .delete(format!("http://{addr}/connections/{a_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    loop {
        match timeout(TIMEOUT, a.next()).await.expect("timeout waiting for close") {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }
    assert!(server.relay().registry().is_empty());

    let resp = client
        .delete(format!("http://{addr}/connections/{a_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn e2e_connections_listing() {
    let (addr, _server) = boot_server().await;
    let (_a, a_id) = connect_text(addr).await;

    let listing: Value = reqwest::get(format!("http://{addr}/connections"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(listing["count"], 1);
    assert_eq!(listing["connections"][0]["id"], a_id.as_str());
}

#[tokio::test]
async fn e2e_health_reports_connections() {
    let (addr, server) = boot_server().await;
    let (_a, _) = connect_text(addr).await;
    let _x = connect(addr, "/ws/image").await;
    wait_for_count(&server, 2).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 2);
    assert_eq!(health["text_sessions"], 1);
    assert_eq!(health["image_sessions"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_connect_disconnect() {
    let (addr, server) = boot_server().await;

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            tokio::spawn(async move {
                // the welcome proves the session is registered
                let (mut ws, _) = connect_text(addr).await;
                if i % 2 == 0 {
                    ws.close(None).await.unwrap();
                    None
                } else {
                    Some(ws)
                }
            })
        })
        .collect();
    let mut kept = Vec::new();
    for task in tasks {
        if let Some(ws) = task.await.unwrap() {
            kept.push(ws);
        }
    }

    wait_for_count(&server, 50).await;
    let ids: std::collections::HashSet<_> = server
        .relay()
        .registry()
        .snapshot()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids.len(), 50);

    drop(kept);
    wait_for_count(&server, 0).await;
}

#[tokio::test]
async fn e2e_shutdown_disconnects_everyone() {
    let (addr, server) = boot_server().await;
    let (mut a, _) = connect_text(addr).await;
    wait_for_count(&server, 1).await;

    server.shutdown().shutdown();

    loop {
        match timeout(TIMEOUT, a.next()).await.expect("timeout waiting for close") {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }
    assert!(server.relay().registry().is_empty());
}

#[tokio::test]
async fn e2e_heartbeat_drops_silent_client() {
    let config = ServerConfig {
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 200,
        ..ServerConfig::default()
    };
    let (addr, server) = boot_server_with(config).await;
    // never polled, so pings are not answered
    let _silent = connect(addr, "/ws/image").await;
    wait_for_count(&server, 1).await;

    wait_for_count(&server, 0).await;
}
