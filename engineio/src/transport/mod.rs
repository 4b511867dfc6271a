//! Transport catalog: the two carriers a session can run on, and the
//! upgrade-ordering policy between them.

use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

pub mod manager;
pub mod polling;
pub mod ws;

/// The name of a transport, as it appears in the `transport=` query
/// parameter and in the handshake's `upgrades` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Polling,
    Websocket,
}

impl TransportType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportType::Polling => "polling",
            TransportType::Websocket => "websocket",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(TransportType::Polling),
            "websocket" => Ok(TransportType::Websocket),
            other => Err(Error::BadHandshake(format!("invalid transport={other}"))),
        }
    }
}
