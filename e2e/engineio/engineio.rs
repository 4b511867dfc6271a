//! End-to-end scenario runner against a live Engine.IO server, mirroring
//! `original_source/example/test_suite/main.go`'s echo server but driving
//! it with an in-process client instead of a human.
//!
//! Each `scenario_*` function drives the server over real HTTP/WebSocket
//! connections and returns `Ok(())` on success. `main` runs them in order
//! and exits non-zero on the first failure.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use engineio::{EngineIoConfig, EngineIoHandler, EngineIoService, Socket};
use futures::{SinkExt, StreamExt};
use hyper::client::HttpConnector;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Method, Request, Server, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tower::Service;

struct EchoHandler;

impl EngineIoHandler for EchoHandler {
    type Data = ();

    fn on_connect(&self, socket: Arc<Socket<()>>) {
        tokio::spawn(async move {
            while let Ok((mtype, payload)) = socket.read_message().await {
                if socket.write_message(mtype, payload).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Spawns the echo server on an ephemeral port and returns its base URL.
async fn spawn_server(config: EngineIoConfig) -> String {
    let svc = EngineIoService::new(EchoHandler, config);
    let make_svc = make_service_fn(move |_conn| {
        let svc = svc.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| svc.clone().call(req))) }
    });
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = Server::bind(&addr).serve(make_svc);
    let local_addr = server.local_addr();
    tokio::spawn(server);
    format!("http://{local_addr}")
}

async fn handshake(client: &Client<HttpConnector>, base: &str) -> (String, serde_json::Value) {
    let uri = format!("{base}/engine.io?EIO=4&transport=polling");
    let resp = client.get(uri.parse().unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    assert_eq!(body[0], b'0', "handshake response must be an OPEN packet");
    let open: serde_json::Value = serde_json::from_slice(&body[1..]).unwrap();
    let sid = open["sid"].as_str().unwrap().to_string();
    (sid, open)
}

/// S1: the handshake returns an `OPEN` packet carrying `sid`, `pingInterval`,
/// `pingTimeout`, `upgrades`, and `maxPayload`.
async fn scenario_handshake(client: &Client<HttpConnector>, base: &str) -> Result<(), String> {
    let (sid, open) = handshake(client, base).await;
    if sid.is_empty() {
        return Err("empty sid in handshake".into());
    }
    for field in ["pingInterval", "pingTimeout", "upgrades", "maxPayload"] {
        if open.get(field).is_none() {
            return Err(format!("handshake payload missing {field}"));
        }
    }
    Ok(())
}

/// S2: a `POST`ed `MESSAGE` packet is echoed back on the next `GET` poll.
async fn scenario_echo(client: &Client<HttpConnector>, base: &str) -> Result<(), String> {
    let (sid, _) = handshake(client, base).await;

    let post_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");
    let req = Request::builder()
        .method(Method::POST)
        .uri(&post_uri)
        .body(Body::from("4hello"))
        .unwrap();
    let resp = client.request(req).await.map_err(|e| e.to_string())?;
    if resp.status() != StatusCode::OK {
        return Err(format!("POST failed: {}", resp.status()));
    }

    let resp = client
        .get(post_uri.parse().unwrap())
        .await
        .map_err(|e| e.to_string())?;
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .map_err(|e| e.to_string())?;
    if &body[..] != b"4hello" {
        return Err(format!("expected echoed 4hello, got {body:?}"));
    }
    Ok(())
}

/// S3: a session with no pong traffic is torn down within `pingTimeout` of
/// `pingInterval` elapsing. Uses a dedicated short-interval server.
async fn scenario_heartbeat_timeout(client: &Client<HttpConnector>) -> Result<(), String> {
    let config = EngineIoConfig::builder()
        .ping_interval(Duration::from_millis(80))
        .ping_timeout(Duration::from_millis(60))
        .build();
    let base = spawn_server(config).await;
    let (sid, _) = handshake(client, &base).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let poll_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");
    let resp = client
        .get(poll_uri.parse().unwrap())
        .await
        .map_err(|e| e.to_string())?;
    if resp.status() == StatusCode::OK {
        return Err("poll on a timed-out session should fail, session should be gone".into());
    }
    Ok(())
}

/// S4: a polling session upgrades to WebSocket via the ping/pong probe and
/// `UPGRADE` packet, and subsequent messages travel over the new transport.
async fn scenario_upgrade(client: &Client<HttpConnector>, base: &str) -> Result<(), String> {
    let (sid, _) = handshake(client, base).await;

    let ws_url = format!(
        "{}/engine.io?EIO=4&transport=websocket&sid={sid}",
        base.replacen("http://", "ws://", 1)
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .map_err(|e| e.to_string())?;

    ws.send(Message::Text("2probe".into()))
        .await
        .map_err(|e| e.to_string())?;
    let pong = ws.next().await.ok_or("stream ended before pong")?.map_err(|e| e.to_string())?;
    if pong != Message::Text("3probe".into()) {
        return Err(format!("expected pong probe, got {pong:?}"));
    }

    ws.send(Message::Text("5".into()))
        .await
        .map_err(|e| e.to_string())?;

    ws.send(Message::Text("4hi-over-ws".into()))
        .await
        .map_err(|e| e.to_string())?;
    let echoed = ws.next().await.ok_or("stream ended before echo")?.map_err(|e| e.to_string())?;
    if echoed != Message::Text("4hi-over-ws".into()) {
        return Err(format!("expected echo over websocket, got {echoed:?}"));
    }

    // The old polling transport must be retired: a GET on it should fail.
    let poll_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");
    let resp = client
        .get(poll_uri.parse().unwrap())
        .await
        .map_err(|e| e.to_string())?;
    if resp.status() == StatusCode::OK {
        return Err("polling GET should be rejected after upgrade to websocket".into());
    }
    Ok(())
}

/// S5: two concurrent `GET`s against the same polling session — the second
/// is rejected and the session is torn down.
async fn scenario_duplicate_get(client: &Client<HttpConnector>, base: &str) -> Result<(), String> {
    let (sid, _) = handshake(client, base).await;
    let poll_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");

    let client1 = client.clone();
    let uri1 = poll_uri.clone();
    let first = tokio::spawn(async move { client1.get(uri1.parse().unwrap()).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = client
        .get(poll_uri.parse().unwrap())
        .await
        .map_err(|e| e.to_string())?;
    if second.status() == StatusCode::OK {
        return Err("second concurrent GET should be rejected".into());
    }
    let _ = first.await;
    Ok(())
}

/// S6: a client-initiated `CLOSE` packet tears the session down; subsequent
/// requests against `sid` fail.
async fn scenario_client_close(client: &Client<HttpConnector>, base: &str) -> Result<(), String> {
    let (sid, _) = handshake(client, base).await;
    let post_uri = format!("{base}/engine.io?EIO=4&transport=polling&sid={sid}");

    let req = Request::builder()
        .method(Method::POST)
        .uri(&post_uri)
        .body(Body::from("1"))
        .unwrap();
    client.request(req).await.map_err(|e| e.to_string())?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let resp = client
        .get(post_uri.parse().unwrap())
        .await
        .map_err(|e| e.to_string())?;
    if resp.status() == StatusCode::OK {
        return Err("poll after client CLOSE should fail, session should be gone".into());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = Client::new();
    let base = spawn_server(EngineIoConfig::default()).await;

    let scenarios: Vec<(&str, Result<(), String>)> = vec![
        ("S1 handshake", scenario_handshake(&client, &base).await),
        ("S2 echo", scenario_echo(&client, &base).await),
        (
            "S3 heartbeat timeout",
            scenario_heartbeat_timeout(&client).await,
        ),
        ("S4 upgrade", scenario_upgrade(&client, &base).await),
        (
            "S5 duplicate GET",
            scenario_duplicate_get(&client, &base).await,
        ),
        ("S6 client close", scenario_client_close(&client, &base).await),
    ];

    let mut failed = false;
    for (name, result) in scenarios {
        match result {
            Ok(()) => println!("PASS  {name}"),
            Err(e) => {
                println!("FAIL  {name}: {e}");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
