//! A minimal Engine.IO echo server: every message received on a session is
//! written straight back to it. Exercises the handshake, long-polling,
//! WebSocket, and upgrade paths end to end.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use engineio::{DisconnectReason, EngineIoHandler, EngineIoService, Socket};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use tower::Service;

struct EchoHandler;

impl EngineIoHandler for EchoHandler {
    type Data = ();

    fn on_connect(&self, socket: Arc<Socket<()>>) {
        tracing::info!("[sid={}] connected", socket.id);
        tokio::spawn(async move {
            loop {
                match socket.read_message().await {
                    Ok((mtype, payload)) => {
                        if let Err(e) = socket.write_message(mtype, payload).await {
                            tracing::debug!("[sid={}] write failed: {e}", socket.id);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("[sid={}] read loop ending: {e}", socket.id);
                        break;
                    }
                }
            }
        });
    }

    fn on_disconnect(&self, socket: Arc<Socket<()>>, reason: DisconnectReason) {
        tracing::info!("[sid={}] disconnected: {:?}", socket.id, reason);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let svc = EngineIoService::new(EchoHandler, Default::default());

    let make_svc = make_service_fn(move |_conn| {
        let svc = svc.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| svc.clone().call(req))) }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("listening on http://{addr}");
    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        tracing::error!("server error: {e}");
    }
}
