//! The application-dispatch collaborator: the hand-off point between the
//! transport core and whatever the embedding application wants to do with
//! a session.

use std::sync::Arc;

use crate::sock::Socket;

/// Why a session was torn down. Threaded through to [`EngineIoHandler::on_disconnect`]
/// so applications can log or record metrics per cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a `CLOSE` packet.
    TransportClose,
    /// No `PONG` arrived within `pingTimeout`.
    PingTimeout,
    /// Two concurrent GETs (or two concurrent POSTs) hit the same polling
    /// session.
    MultipleHttpPollingError,
    /// A packet failed to parse.
    PacketParsingError,
    /// The upgrade handshake failed partway through.
    UpgradeError,
    /// The underlying connection errored out (I/O failure).
    TransportError,
    /// The server closed the session on its own initiative.
    ServerClose,
}

/// The application's entry point into a session's lifecycle.
///
/// `on_connect` is called once, right after the handshake packet is sent,
/// and is where an application typically spawns its own task driving
/// [`Socket::read_message`]/[`Socket::write_message`] in a loop (see
/// `demos/echo-server` and `e2e/engineio/engineio.rs` for the idiom, both
/// grounded in `original_source/example/test_suite/main.go`'s read loop).
pub trait EngineIoHandler: Send + Sync + 'static {
    /// Arbitrary per-socket application state, stored on [`Socket`].
    type Data: Default + Send + Sync + 'static;

    fn on_connect(&self, socket: Arc<Socket<Self::Data>>);

    fn on_disconnect(&self, _socket: Arc<Socket<Self::Data>>, _reason: DisconnectReason) {}
}
