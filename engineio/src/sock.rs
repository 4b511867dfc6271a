//! The per-client session state machine: handshake, heartbeat, transport
//! upgrade, close, and the message read/write surface the application
//! drives. Grounded directly in `original_source/session.go`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use http::Method;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

use crate::errors::Error;
use crate::handler::DisconnectReason;
use crate::heartbeat::{self, Generation};
use crate::packet::{MessageType, Packet, PacketType};
use crate::sid::Sid;
use crate::transport::polling::PollingCarrier;
use crate::transport::ws::WsCarrier;
use crate::transport::TransportType;

pub(crate) type SessionMap<D> = Arc<DashMap<Sid, Arc<Socket<D>>>>;

/// Fired exactly once from `Socket::close`, regardless of which call site
/// triggered it. Lets `EngineIo::create_session` hand each socket a way to
/// reach back into the handler without the socket holding an `Arc<EngineIo<H>>`.
pub(crate) type OnDisconnectFn<D> = Arc<dyn Fn(Arc<Socket<D>>, DisconnectReason) + Send + Sync>;

/// The transport currently carrying a session. A "tagged variant behind a
/// lock", per spec.md §9's design note, rather than the teacher's
/// internal-mpsc fan-in.
pub(crate) enum CarrierHandle {
    Polling(Arc<PollingCarrier>),
    Ws(Arc<WsCarrier>),
}

impl CarrierHandle {
    pub(crate) fn transport_type(&self) -> TransportType {
        match self {
            CarrierHandle::Polling(_) => TransportType::Polling,
            CarrierHandle::Ws(_) => TransportType::Websocket,
        }
    }

    async fn read(&self) -> Result<Packet, Error> {
        match self {
            CarrierHandle::Polling(c) => c.read().await,
            CarrierHandle::Ws(c) => c.read().await,
        }
    }

    async fn write(&self, packet: Packet) -> Result<(), Error> {
        match self {
            CarrierHandle::Polling(c) => c.write(packet).await,
            CarrierHandle::Ws(c) => c.write(packet).await,
        }
    }

    fn pause(&self) {
        match self {
            CarrierHandle::Polling(c) => c.pause(),
            CarrierHandle::Ws(_) => unreachable!("the websocket carrier is never paused"),
        }
    }

    async fn close(&self, noop: bool) {
        match self {
            CarrierHandle::Polling(c) => c.close(noop).await,
            CarrierHandle::Ws(c) => c.close().await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SessionState {
    Handshaking = 0,
    Open = 1,
    Upgrading = 2,
    Closed = 3,
}

impl From<u8> for SessionState {
    fn from(v: u8) -> Self {
        match v {
            0 => SessionState::Handshaking,
            1 => SessionState::Open,
            2 => SessionState::Upgrading,
            _ => SessionState::Closed,
        }
    }
}

/// A logical, long-lived connection identified by [`Sid`], potentially
/// spanning multiple carriers over its lifetime.
pub struct Socket<D> {
    pub id: Sid,
    pub data: D,

    pub(crate) carrier: RwLock<CarrierHandle>,
    state: AtomicU8,
    client_close: AtomicBool,

    get_lock: Arc<AsyncMutex<()>>,
    post_lock: Arc<AsyncMutex<()>>,

    pong_tx: mpsc::Sender<()>,
    pong_rx: AsyncMutex<mpsc::Receiver<()>>,
    heartbeat_gen: AsyncMutex<Option<Generation>>,

    close_tx: watch::Sender<bool>,
    close_rx: watch::Receiver<bool>,

    ping_interval: Duration,
    ping_timeout: Duration,

    sessions: SessionMap<D>,
    on_disconnect: OnDisconnectFn<D>,
}

pub(crate) enum MethodGuard {
    Locked(OwnedMutexGuard<()>),
    NotRequired,
}

impl<D> Socket<D>
where
    D: Default + Send + Sync + 'static,
{
    pub(crate) fn new(
        id: Sid,
        carrier: CarrierHandle,
        ping_interval: Duration,
        ping_timeout: Duration,
        sessions: SessionMap<D>,
        on_disconnect: OnDisconnectFn<D>,
    ) -> Arc<Self> {
        let (pong_tx, pong_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = watch::channel(false);
        Arc::new(Self {
            id,
            data: D::default(),
            carrier: RwLock::new(carrier),
            state: AtomicU8::new(SessionState::Handshaking as u8),
            client_close: AtomicBool::new(false),
            get_lock: Arc::new(AsyncMutex::new(())),
            post_lock: Arc::new(AsyncMutex::new(())),
            pong_tx,
            pong_rx: AsyncMutex::new(pong_rx),
            heartbeat_gen: AsyncMutex::new(None),
            close_tx,
            close_rx,
            ping_interval,
            ping_timeout,
            sessions,
            on_disconnect,
        })
    }

    /// The transport currently carrying this session ("polling" or
    /// "websocket").
    pub async fn transport(&self) -> TransportType {
        self.carrier.read().await.transport_type()
    }

    /// Returns the current carrier as a [`PollingCarrier`], or `None` if
    /// this session is presently carried over WebSocket.
    pub(crate) async fn polling_carrier(&self) -> Option<Arc<PollingCarrier>> {
        match &*self.carrier.read().await {
            CarrierHandle::Polling(c) => Some(c.clone()),
            CarrierHandle::Ws(_) => None,
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Marks the handshake complete and starts the first heartbeat
    /// generation. Called once the OPEN packet has actually reached the
    /// carrier (for polling: the handshake HTTP response; for websocket:
    /// the first frame on the upgraded connection).
    pub(crate) async fn mark_open(self: &Arc<Self>) {
        self.set_state(SessionState::Open);
        self.restart_heartbeat().await;
    }

    async fn restart_heartbeat(self: &Arc<Self>) {
        let gen = heartbeat::spawn(self.clone(), self.ping_interval, self.ping_timeout);
        *self.heartbeat_gen.lock().await = Some(gen);
    }

    /// Sends one packet through the current carrier without the
    /// application-facing retry-on-upgrade policy. Used for the heartbeat
    /// PING and the handshake OPEN.
    pub(crate) async fn write_packet_once(&self, packet: Packet) -> Result<(), Error> {
        self.carrier.read().await.write(packet).await
    }

    /// Blocks until a PONG is observed, a close is signaled, or the caller's
    /// `select!` branch is abandoned. Only ever awaited from the heartbeat's
    /// own ping arm.
    pub(crate) async fn wait_pong(&self) {
        let _ = self.pong_rx.lock().await.recv().await;
    }

    pub(crate) fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.close_rx.clone()
    }

    /// `ReadMessage`: reads one application message, transparently handling
    /// `PONG` (forwarded to the heartbeat) and `CLOSE` (tears the session
    /// down) and retrying once across an in-flight carrier upgrade.
    pub async fn read_message(self: &Arc<Self>) -> Result<(MessageType, Bytes), Error> {
        let mut retry = true;
        loop {
            let result = self.carrier.read().await.read().await;
            match result {
                Ok(packet) => match packet.ptype {
                    PacketType::Pong => {
                        let _ = self.pong_tx.try_send(());
                        continue;
                    }
                    PacketType::Close => {
                        self.client_close.store(true, Ordering::Release);
                        self.close(DisconnectReason::TransportClose).await;
                        continue;
                    }
                    _ => return Ok((packet.mtype, packet.payload)),
                },
                Err(Error::Upgrading) | Err(Error::Closed) if retry => {
                    retry = false;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `WriteMessage`: wraps `payload` as a `MESSAGE` packet and writes it
    /// through the current carrier, retrying once across an in-flight
    /// upgrade.
    pub async fn write_message(&self, mtype: MessageType, payload: Bytes) -> Result<(), Error> {
        let mut retry = true;
        loop {
            let packet = Packet::message(mtype, payload.clone());
            match self.carrier.read().await.write(packet).await {
                Ok(()) => return Ok(()),
                Err(Error::Upgrading) | Err(Error::Closed) if retry => {
                    retry = false;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `Unique(method)`: at most one in-flight GET and one in-flight POST
    /// per polling session. WebSocket sessions have no such restriction
    /// (spec.md §4.E; `original_source/session.go`'s unconditional
    /// `return false` for websocket is not carried forward — see
    /// DESIGN.md).
    pub(crate) async fn try_lock_method(&self, method: &Method) -> Option<MethodGuard> {
        if self.transport().await == TransportType::Websocket {
            return Some(MethodGuard::NotRequired);
        }
        let lock = match *method {
            Method::GET => &self.get_lock,
            Method::POST => &self.post_lock,
            _ => return Some(MethodGuard::NotRequired),
        };
        lock.clone().try_lock_owned().ok().map(MethodGuard::Locked)
    }

    /// Runs the upgrade protocol's steps 1, 3-8 (step 2, accepting the new
    /// carrier, already happened in the caller — see
    /// `transport::ws::handle_upgrade_request`). Closes the session if any
    /// step after stopping the old heartbeat fails.
    pub(crate) async fn complete_upgrade(self: &Arc<Self>, new_carrier: Arc<WsCarrier>) {
        if let Err(e) = self.try_complete_upgrade(new_carrier).await {
            #[cfg(feature = "tracing")]
            tracing::debug!("[sid={}] upgrade failed: {}", self.id, e);
            self.close(DisconnectReason::UpgradeError).await;
        }
    }

    async fn try_complete_upgrade(
        self: &Arc<Self>,
        new_carrier: Arc<WsCarrier>,
    ) -> Result<(), Error> {
        self.set_state(SessionState::Upgrading);
        // Step 1: stop the current heartbeat generation.
        self.heartbeat_gen.lock().await.take();

        // Step 3: the client's probe PING.
        let probe = new_carrier.read().await?;
        if probe.ptype != PacketType::Ping {
            return Err(Error::BadPacket(probe.ptype));
        }

        // Step 4: echo it back as PONG.
        new_carrier.write(Packet::pong(probe.payload)).await?;

        // Step 5: pause the old carrier. Any in-flight GET is drained with
        // a NOOP by the next poll or by the final `close(noop=true)` below.
        {
            let old = self.carrier.read().await;
            old.pause();
        }

        // Step 6: the client's UPGRADE packet.
        let upgrade = new_carrier.read().await?;
        if upgrade.ptype != PacketType::Upgrade {
            return Err(Error::BadPacket(upgrade.ptype));
        }

        // Step 7: atomically swap the carrier reference.
        let old_carrier = {
            let mut guard = self.carrier.write().await;
            std::mem::replace(&mut *guard, CarrierHandle::Ws(new_carrier))
        };

        // Step 8: close the old carrier (noop, not a session-level close)
        // and start a fresh heartbeat generation on the new carrier.
        old_carrier.close(true).await;
        self.set_state(SessionState::Open);
        self.restart_heartbeat().await;
        Ok(())
    }

    /// Idempotent session teardown: unregisters from the session map,
    /// cancels the heartbeat, and closes the carrier. A parked GET is
    /// drained with `NOOP` if the client already sent `CLOSE` (it already
    /// knows), or with `CLOSE` if the server is the one ending things.
    pub async fn close(self: &Arc<Self>, reason: DisconnectReason) {
        if self.close_tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        }) {
            self.set_state(SessionState::Closed);
            self.sessions.remove(&self.id);
            self.heartbeat_gen.lock().await.take();
            let noop = self.client_close.load(Ordering::Acquire);
            self.carrier.read().await.close(noop).await;
            (self.on_disconnect)(self.clone(), reason);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }
}
