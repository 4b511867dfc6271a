//! The error taxonomy of the Engine.IO core (spec §7) plus the HTTP/WS
//! plumbing errors a `tower::Service` needs to surface.

use http::StatusCode;

use crate::sid::Sid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad framing on a received packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Operation attempted on a carrier that has been paused pending an
    /// upgrade. The session retries once on the new carrier.
    #[error("Engine.IO transport upgrading")]
    Upgrading,

    /// Operation attempted on a carrier that has already been closed.
    #[error("Engine.IO transport closed")]
    Closed,

    /// Two in-flight GETs, or two in-flight POSTs, on one polling session.
    #[error("duplicate request")]
    DuplicateRequest,

    /// No pong arrived within `pingTimeout`.
    #[error("ping timeout")]
    PingTimeout,

    /// The underlying I/O (HTTP body, WebSocket frame) failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// `EIO` mismatch, unknown `transport`, unknown `sid`, or an illegal
    /// upgrade request.
    #[error("bad handshake: {0}")]
    BadHandshake(String),

    /// An unrecognized `sid` was given.
    #[error("session={0} not exist")]
    UnknownSessionId(Sid),

    /// A session exists, but on a different transport than the carrier
    /// handling the current request expects.
    #[error("transport mismatch")]
    TransportMismatch,

    /// A handler returned a packet the protocol doesn't allow at this
    /// point (e.g. anything but PING during the upgrade probe).
    #[error("unexpected packet: {0:?}")]
    BadPacket(crate::packet::PacketType),

    /// The WebSocket upgrade handshake failed.
    #[error("websocket upgrade error: {0}")]
    UpgradeError(String),

    /// An `http`/`hyper` error occurred while building a response.
    #[error("http error: {0}")]
    Http(#[from] http::Error),
}

impl Error {
    /// The HTTP status this error should surface to the client as, for the
    /// error paths that terminate a request without a protocol-level
    /// response body of their own.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
