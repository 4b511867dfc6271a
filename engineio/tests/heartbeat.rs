//! S3: a session with no pong traffic is torn down once `pingTimeout`
//! elapses past a ping with no answering pong.

mod common;

use std::time::Duration;

use engineio::EngineIoConfig;
use hyper::{Client, StatusCode};

#[tokio::test]
async fn silent_session_is_closed_after_ping_timeout() {
    let config = EngineIoConfig::builder()
        .ping_interval(Duration::from_millis(80))
        .ping_timeout(Duration::from_millis(60))
        .build();
    let base = common::spawn_echo_server(config).await;
    let client = Client::new();

    let uri = format!("{base}/engine.io?EIO=4&transport=polling");
    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let open: serde_json::Value = serde_json::from_slice(&body[1..]).unwrap();
    let sid = open["sid"].as_str().unwrap();

    // A silent client never answers the PING the heartbeat sends at
    // pingInterval; after pingInterval + pingTimeout the session is gone.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let poll_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");
    let resp = client.get(poll_uri.parse().unwrap()).await.unwrap();
    assert_ne!(resp.status(), StatusCode::OK);
}
