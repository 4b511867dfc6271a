//! The long-polling carrier: a rendezvous between asynchronous HTTP
//! handlers (`GET`/`POST /engine.io`) and the session's `Read`/`Write`
//! operations. Grounded in `original_source/transport/polling/server.go`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::{DisconnectReason, EngineIoHandler};
use crate::packet::{decode_polling_frame, encode_packet, MessageType, Packet};
use crate::res::http_response;
use crate::sid::Sid;
use crate::sock::CarrierHandle;

struct ParkedPoll {
    respond: oneshot::Sender<(Bytes, bool)>,
}

struct ParkedPost {
    body: Bytes,
    ack: oneshot::Sender<Result<(), String>>,
}

/// `original_source/transport/polling/server.go`'s `serverConn`, minus the
/// goroutine-per-channel plumbing: two optional "parked request" slots plus
/// the flags that make waits on them terminate.
pub struct PollingCarrier {
    poll_slot: AsyncMutex<Option<ParkedPoll>>,
    poll_waiters: Notify,
    data_slot: AsyncMutex<Option<ParkedPost>>,
    data_waiters: Notify,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl PollingCarrier {
    pub(crate) fn new() -> Self {
        Self {
            poll_slot: AsyncMutex::new(None),
            poll_waiters: Notify::new(),
            data_slot: AsyncMutex::new(None),
            data_waiters: Notify::new(),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// `onPoll`: parks `w` (represented here by the oneshot sender half of
    /// the HTTP response) until a `Write` claims it or the carrier is torn
    /// down or paused.
    async fn on_poll(&self) -> Result<(Bytes, bool), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if self.paused.load(Ordering::Acquire) {
            return Ok((encode_packet(&Packet::noop()), false));
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.poll_slot.lock().await;
            if slot.is_some() {
                return Err(Error::DuplicateRequest);
            }
            *slot = Some(ParkedPoll { respond: tx });
        }
        self.poll_waiters.notify_one();
        rx.await.map_err(|_| Error::Closed)
    }

    /// `onData`: queues one POSTed body for the session reader and waits
    /// for it to be consumed (successfully or not).
    async fn on_data(&self, body: Bytes) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.data_slot.lock().await;
            if slot.is_some() {
                return Err(Error::DuplicateRequest);
            }
            *slot = Some(ParkedPost { body, ack: tx });
        }
        self.data_waiters.notify_one();
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(Error::MalformedPacket(msg)),
            Err(_) => Err(Error::Closed),
        }
    }

    pub(crate) async fn write(&self, packet: Packet) -> Result<(), Error> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            if self.paused.load(Ordering::Acquire) {
                return Err(Error::Upgrading);
            }
            if let Some(parked) = self.poll_slot.lock().await.take() {
                let is_binary = packet.mtype == MessageType::Binary;
                let _ = parked.respond.send((encode_packet(&packet), is_binary));
                return Ok(());
            }
            self.poll_waiters.notified().await;
        }
    }

    pub(crate) async fn read(&self) -> Result<Packet, Error> {
        loop {
            if self.paused.load(Ordering::Acquire) {
                return Err(Error::Upgrading);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            if let Some(parked) = self.data_slot.lock().await.take() {
                return match decode_polling_frame(&parked.body) {
                    Ok(packet) => {
                        let _ = parked.ack.send(Ok(()));
                        Ok(packet)
                    }
                    Err(e) => {
                        let _ = parked.ack.send(Err(e.to_string()));
                        Err(e)
                    }
                };
            }
            self.data_waiters.notified().await;
        }
    }

    /// A parked GET and a blocked `read`/`write` both stay parked; only
    /// `close` wakes them, never `pause` itself (matches
    /// `original_source/transport/polling/server.go`'s `Read`, which has
    /// no pause-driven wakeup).
    pub(crate) fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// `noop`: write `NOOP` to a parked GET instead of `CLOSE`, used when
    /// this carrier is being retired by a completed upgrade rather than by
    /// the session actually ending.
    pub(crate) async fn close(&self, noop: bool) {
        self.closed.store(true, Ordering::Release);
        if let Some(parked) = self.poll_slot.lock().await.take() {
            let packet = if noop { Packet::noop() } else { Packet::close() };
            let _ = parked.respond.send((encode_packet(&packet), false));
        }
        if let Some(parked) = self.data_slot.lock().await.take() {
            let _ = parked.ack.send(Err(Error::Closed.to_string()));
        }
        self.poll_waiters.notify_waiters();
        self.data_waiters.notify_waiters();
    }
}

/// `GET /engine.io` with no `sid`: the handshake. The `OPEN` packet is
/// returned directly as this response's body rather than routed through
/// the rendezvous above, matching the teacher's `open_req` rather than
/// `original_source`'s goroutine-based bootstrap (see DESIGN.md).
pub async fn open_req<H, B>(
    engine: Arc<EngineIo<H>>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    B: Send + 'static,
{
    let carrier = CarrierHandle::Polling(Arc::new(PollingCarrier::new()));
    let socket = engine.create_session(carrier).await;
    let open = Packet::open(crate::transport::TransportType::Polling, socket.id, &engine.config);
    let body = encode_packet(&open);
    socket.mark_open().await;
    engine.handler.on_connect(socket.clone());
    http_response(StatusCode::OK, body, false)
}

/// `GET /engine.io?sid=…`: the long-poll itself.
pub async fn polling_req<H, B>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    B: Send + 'static,
{
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionId(sid))?;
    let carrier = socket.polling_carrier().await.ok_or(Error::TransportMismatch)?;
    let result = carrier.on_poll().await;
    match result {
        Ok((body, is_binary)) => http_response(StatusCode::OK, body, is_binary),
        Err(e @ Error::DuplicateRequest) => {
            engine.close_session(sid, DisconnectReason::MultipleHttpPollingError).await;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// `POST /engine.io?sid=…`: one inbound packet.
pub async fn post_req<H, B, R>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    req: Request<R>,
    max_payload: usize,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    R: http_body::Body + Send + 'static,
    R::Data: Into<Bytes> + Send,
    R::Error: std::fmt::Display,
    B: Send + 'static,
{
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionId(sid))?;
    let carrier = socket.polling_carrier().await.ok_or(Error::TransportMismatch)?;

    let body = crate::body::collect_bounded(req.into_body(), max_payload).await?;

    match carrier.on_data(body).await {
        Ok(()) => Ok(http_response(StatusCode::OK, "ok", false)?),
        Err(e @ Error::MalformedPacket(_)) => {
            engine.close_session(sid, DisconnectReason::PacketParsingError).await;
            Err(e)
        }
        Err(e @ Error::DuplicateRequest) => {
            engine.close_session(sid, DisconnectReason::MultipleHttpPollingError).await;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn write_blocks_until_a_get_parks() {
        let carrier = Arc::new(PollingCarrier::new());
        let c2 = carrier.clone();
        let writer = tokio::spawn(async move {
            c2.write(Packet::message(crate::packet::MessageType::Text, Bytes::from_static(b"hi")))
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let (body, is_binary) = carrier.on_poll().await.unwrap();
        assert_eq!(&body[..], b"4hi");
        assert!(!is_binary);
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn concurrent_poll_is_rejected() {
        let carrier = Arc::new(PollingCarrier::new());
        let c2 = carrier.clone();
        let first = tokio::spawn(async move { c2.on_poll().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = carrier.on_poll().await;
        assert!(matches!(second, Err(Error::DuplicateRequest)));
        carrier.close(true).await;
        let _ = first.await;
    }

    #[tokio::test]
    async fn read_surfaces_malformed_packet_and_acks_post() {
        let carrier = PollingCarrier::new();
        let reader = async {
            let err = carrier.read().await.unwrap_err();
            assert!(matches!(err, Error::MalformedPacket(_)));
        };
        let poster = async {
            let err = carrier.on_data(Bytes::from_static(b"9bad")).await.unwrap_err();
            assert!(matches!(err, Error::MalformedPacket(_)));
        };
        tokio::join!(reader, poster);
    }

    #[tokio::test]
    async fn paused_read_returns_upgrading() {
        let carrier = PollingCarrier::new();
        carrier.pause();
        assert!(matches!(carrier.read().await, Err(Error::Upgrading)));
        assert!(matches!(
            carrier.write(Packet::noop()).await,
            Err(Error::Upgrading)
        ));
    }
}
