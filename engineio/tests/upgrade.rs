//! S4: a long-polling session upgrades to WebSocket via the ping/pong
//! probe and `UPGRADE` packet (spec.md §4.D), and the old transport is
//! retired once the swap completes.

mod common;

use engineio::EngineIoConfig;
use futures::{SinkExt, StreamExt};
use hyper::{Client, StatusCode};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn polling_session_upgrades_to_websocket() {
    let base = common::spawn_echo_server(EngineIoConfig::default()).await;
    let client = Client::new();

    let handshake_uri = format!("{base}/engine.io?EIO=4&transport=polling");
    let resp = client.get(handshake_uri.parse().unwrap()).await.unwrap();
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let open: serde_json::Value = serde_json::from_slice(&body[1..]).unwrap();
    let sid = open["sid"].as_str().unwrap().to_string();

    let ws_url = format!(
        "{}/engine.io?EIO=4&transport=websocket&sid={sid}",
        base.replacen("http://", "ws://", 1)
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

    ws.send(Message::Text("2probe".into())).await.unwrap();
    let pong = ws.next().await.unwrap().unwrap();
    assert_eq!(pong, Message::Text("3probe".into()));

    ws.send(Message::Text("5".into())).await.unwrap();

    ws.send(Message::Text("4hi-over-ws".into())).await.unwrap();
    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Text("4hi-over-ws".into()));

    let poll_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");
    let resp = client.get(poll_uri.parse().unwrap()).await.unwrap();
    assert_ne!(
        resp.status(),
        StatusCode::OK,
        "the retired polling transport must no longer serve this session"
    );
}
