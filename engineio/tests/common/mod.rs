use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use engineio::{EngineIoConfig, EngineIoHandler, EngineIoService, Socket};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use tower::Service;

pub struct EchoHandler;

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

/// Binds an echoing Engine.IO server on an ephemeral port and returns its
/// base URL (`http://127.0.0.1:PORT`).
pub async fn spawn_echo_server(config: EngineIoConfig) -> String {
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
