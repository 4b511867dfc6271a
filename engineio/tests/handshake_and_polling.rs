//! S1 (handshake), S2 (echo), S5 (duplicate GET), S6 (client close) against
//! a live long-polling session, grounded in
//! `original_source/example/test_suite/main.go`'s echo loop.

mod common;

use std::time::Duration;

use engineio::EngineIoConfig;
use hyper::{Body, Client, Method, Request, StatusCode};

async fn open_session(client: &Client<hyper::client::HttpConnector>, base: &str) -> String {
    let uri = format!("{base}/engine.io?EIO=4&transport=polling");
    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(body[0], b'0');
    let open: serde_json::Value = serde_json::from_slice(&body[1..]).unwrap();
    open["sid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn handshake_carries_sid_and_config() {
    let base = common::spawn_echo_server(EngineIoConfig::default()).await;
    let client = Client::new();

    let uri = format!("{base}/engine.io?EIO=4&transport=polling");
    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(body[0], b'0', "handshake must be an OPEN packet");
    let open: serde_json::Value = serde_json::from_slice(&body[1..]).unwrap();
    assert!(!open["sid"].as_str().unwrap().is_empty());
    assert!(open["pingInterval"].is_number());
    assert!(open["pingTimeout"].is_number());
    assert!(open["upgrades"].is_array());
}

#[tokio::test]
async fn posted_message_is_echoed_on_next_poll() {
    let base = common::spawn_echo_server(EngineIoConfig::default()).await;
    let client = Client::new();
    let sid = open_session(&client, &base).await;

    let uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");
    let post = Request::builder()
        .method(Method::POST)
        .uri(&uri)
        .body(Body::from("4hello"))
        .unwrap();
    let resp = client.request(post).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(&body[..], b"4hello");
}

#[tokio::test]
async fn second_concurrent_get_is_rejected_and_session_closes() {
    let base = common::spawn_echo_server(EngineIoConfig::default()).await;
    let client = Client::new();
    let sid = open_session(&client, &base).await;
    let uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");

    let client1 = client.clone();
    let uri1 = uri.clone();
    let parked = tokio::spawn(async move { client1.get(uri1.parse().unwrap()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client.get(uri.parse().unwrap()).await.unwrap();
    assert_ne!(second.status(), StatusCode::OK);

    let _ = parked.await;

    // the session was torn down as a side effect; a further GET fails
    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    assert_ne!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn client_close_packet_tears_down_the_session() {
    let base = common::spawn_echo_server(EngineIoConfig::default()).await;
    let client = Client::new();
    let sid = open_session(&client, &base).await;
    let uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");

    let close = Request::builder()
        .method(Method::POST)
        .uri(&uri)
        .body(Body::from("1"))
        .unwrap();
    client.request(close).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    assert_ne!(resp.status(), StatusCode::OK);
}
