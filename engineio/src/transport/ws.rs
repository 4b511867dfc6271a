//! The WebSocket carrier: a framed, full-duplex connection with no
//! pause/park dance. Grounded in the teacher's `transport/ws.rs` and
//! `original_source/transport/websocket/connect.go`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use http::{HeaderValue, Request, Response};
use hyper::upgrade::Upgraded;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketConfig, WebSocketStream};

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::{DisconnectReason, EngineIoHandler};
use crate::packet::{decode_ws_message, Packet};
use crate::res::ws_response;
use crate::sid::Sid;
use crate::sock::CarrierHandle;

type Sink = futures::stream::SplitSink<WebSocketStream<Upgraded>, Message>;
type Stream = futures::stream::SplitStream<WebSocketStream<Upgraded>>;

/// `original_source/transport/websocket/transport.go`'s `Conn`: one framed
/// socket, writes serialized behind a mutex since the heartbeat and the
/// application both write concurrently.
pub struct WsCarrier {
    sink: AsyncMutex<Sink>,
    stream: AsyncMutex<Stream>,
    closed: AtomicBool,
}

impl WsCarrier {
    pub(crate) fn new(ws: WebSocketStream<Upgraded>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: AsyncMutex::new(sink),
            stream: AsyncMutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) async fn read(&self) -> Result<Packet, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let mut stream = self.stream.lock().await;
        match stream.next().await {
            Some(Ok(msg)) => decode_ws_message(msg),
            Some(Err(e)) => Err(Error::TransportError(e.to_string())),
            None => Err(Error::Closed),
        }
    }

    pub(crate) async fn write(&self, packet: Packet) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let msg = Message::try_from(&packet)?;
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| Error::TransportError(e.to_string()))
    }

    /// Idempotent: writes a WebSocket `Close` frame and marks the carrier
    /// dead exactly once.
    pub(crate) async fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.sink.lock().await.send(Message::Close(None)).await;
        }
    }
}

fn ws_config() -> WebSocketConfig {
    WebSocketConfig {
        max_send_queue: None,
        max_message_size: Some(16 << 20),
        max_frame_size: Some(16 << 20),
        accept_unmasked_frames: false,
    }
}

fn ws_key_from<B>(req: &Request<B>) -> Result<HeaderValue, Error> {
    req.headers()
        .get("Sec-WebSocket-Key")
        .cloned()
        .ok_or_else(|| Error::BadHandshake("missing Sec-WebSocket-Key".into()))
}

/// `GET /engine.io?transport=websocket` with no `sid`: a brand-new
/// WebSocket connection. Responds `101` immediately and finishes the
/// handshake in the background once the connection is actually upgraded
/// (the `hyper::upgrade::on` future only resolves after the response has
/// been flushed to the client).
pub async fn open_req<H, B, R>(
    engine: Arc<EngineIo<H>>,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    R: Send + 'static,
    B: Send + 'static,
{
    let ws_key = ws_key_from(&req)?;
    let response = ws_response(&ws_key)?;

    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(req).await {
            Ok(u) => u,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("websocket upgrade failed: {_e}");
                return;
            }
        };
        let ws =
            WebSocketStream::from_raw_socket(upgraded, tokio_tungstenite::tungstenite::protocol::Role::Server, Some(ws_config()))
                .await;
        let carrier = Arc::new(WsCarrier::new(ws));

        let socket = engine
            .create_session(CarrierHandle::Ws(carrier.clone()))
            .await;

        let open = Packet::open(
            crate::transport::TransportType::Websocket,
            socket.id,
            &engine.config,
        );
        if carrier.write(open).await.is_err() {
            engine
                .close_session(socket.id, DisconnectReason::TransportError)
                .await;
            return;
        }
        socket.mark_open().await;
        engine.handler.on_connect(socket);
    });

    Ok(response)
}

/// `GET /engine.io?sid=…&transport=websocket`: the upgrade probe on an
/// existing polling session (spec.md §4.D steps 2-8; step 1 runs inside
/// `Socket::complete_upgrade`).
pub async fn upgrade_req<H, B, R>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    R: Send + 'static,
    B: Send + 'static,
{
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionId(sid))?;
    let ws_key = ws_key_from(&req)?;
    let response = ws_response(&ws_key)?;

    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(req).await {
            Ok(u) => u,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("[sid={sid}] websocket upgrade failed: {_e}");
                socket.close(DisconnectReason::UpgradeError).await;
                return;
            }
        };
        let ws =
            WebSocketStream::from_raw_socket(upgraded, tokio_tungstenite::tungstenite::protocol::Role::Server, Some(ws_config()))
                .await;
        let carrier = Arc::new(WsCarrier::new(ws));
        socket.complete_upgrade(carrier).await;
    });

    Ok(response)
}
