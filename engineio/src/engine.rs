//! The server-wide state: configuration, the handler, the transport
//! upgrade policy, and the session registry. Grounded in
//! `original_source/server.go`'s `Server` plus the teacher's `EngineIo`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::EngineIoConfig;
use crate::handler::{DisconnectReason, EngineIoHandler};
use crate::sid::Sid;
use crate::sock::{CarrierHandle, OnDisconnectFn, Socket};
use crate::transport::manager::TransportManager;

/// Owns every open session and the policy used to create and upgrade them.
/// Constructed once per server and shared (via `Arc`) with the
/// `tower::Service` built on top of it.
pub struct EngineIo<H: EngineIoHandler> {
    pub config: EngineIoConfig,
    pub handler: H,
    pub(crate) transports: TransportManager,
    sessions: Arc<DashMap<Sid, Arc<Socket<H::Data>>>>,
}

impl<H: EngineIoHandler> EngineIo<H> {
    pub fn new(handler: H, config: EngineIoConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler,
            transports: TransportManager::default(),
            sessions: Arc::new(DashMap::new()),
        })
    }

    /// Mints a `Sid`, wraps `carrier` in a new [`Socket`], and registers it
    /// in the session map. The handshake packet is sent by the caller
    /// (`transport::polling::open_req` / `transport::ws::open_req`), not
    /// here — see DESIGN.md for why the rendezvous-based bootstrap in
    /// `original_source/server.go` was not carried forward verbatim.
    pub(crate) async fn create_session(self: &Arc<Self>, carrier: CarrierHandle) -> Arc<Socket<H::Data>> {
        let id = self.config.sid_generator.next_id();
        let engine = self.clone();
        let on_disconnect: OnDisconnectFn<H::Data> = Arc::new(move |socket, reason| {
            engine.handler.on_disconnect(socket, reason);
        });
        let socket = Socket::new(
            id,
            carrier,
            self.config.ping_interval,
            self.config.ping_timeout,
            self.sessions.clone(),
            on_disconnect,
        );
        self.sessions.insert(id, socket.clone());
        #[cfg(feature = "tracing")]
        tracing::debug!("[sid={id}] session created");
        socket
    }

    pub(crate) fn get_socket(&self, sid: Sid) -> Option<Arc<Socket<H::Data>>> {
        self.sessions.get(&sid).map(|e| e.clone())
    }

    /// Closing through here or straight from a `Socket` both reach the
    /// handler exactly once — `Socket::close` fires `on_disconnect` itself.
    pub(crate) async fn close_session(&self, sid: Sid, reason: DisconnectReason) {
        if let Some(socket) = self.get_socket(sid) {
            socket.close(reason).await;
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
