//! Engine.IO v4 server transport: framed packet delivery, session
//! lifecycle, heartbeat, and the HTTP-long-polling/WebSocket transport
//! upgrade, exposed as a [`tower::Service`].
//!
//! The crate is organized the way `original_source` splits the problem:
//! a packet codec ([`packet`]), two carriers ([`transport::polling`],
//! [`transport::ws`]) behind a common session abstraction ([`sock`]), a
//! heartbeat loop ([`heartbeat`]), and a server-wide dispatcher
//! ([`service`]) sitting on top of the session registry ([`engine`]).

mod body;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handler;
mod heartbeat;
pub mod packet;
mod res;
pub mod service;
pub mod sid;
mod sock;
pub mod transport;

pub use config::{EngineIoConfig, EngineIoConfigBuilder};
pub use engine::EngineIo;
pub use errors::Error;
pub use handler::{DisconnectReason, EngineIoHandler};
pub use packet::MessageType;
pub use service::EngineIoService;
pub use sid::{Sid, SidGenerator};
pub use sock::Socket;
pub use transport::TransportType;
