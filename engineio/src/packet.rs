//! The Engine.IO packet wire format: a one-byte packet-type prefix plus an
//! optional payload, with a leading `'b'` byte distinguishing binary
//! messages from the polling carrier's text framing.

use bytes::Bytes;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use crate::config::EngineIoConfig;
use crate::errors::Error;
use crate::sid::Sid;
use crate::transport::TransportType;

/// The type of the underlying frame a packet was or will be carried in.
///
/// This mirrors the two WebSocket frame kinds (RFC 6455 §11.8) and, on the
/// polling carrier, the presence or absence of the `'b'` prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text = 1,
    Binary = 2,
}

/// One of the seven Engine.IO packet types, encoded on the wire as the
/// single ASCII digit `'0'`..=`'6'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Open = 0,
    Close = 1,
    Ping = 2,
    Pong = 3,
    Message = 4,
    Upgrade = 5,
    Noop = 6,
}

impl PacketType {
    fn from_digit(b: u8) -> Result<Self, Error> {
        match b {
            b'0' => Ok(PacketType::Open),
            b'1' => Ok(PacketType::Close),
            b'2' => Ok(PacketType::Ping),
            b'3' => Ok(PacketType::Pong),
            b'4' => Ok(PacketType::Message),
            b'5' => Ok(PacketType::Upgrade),
            b'6' => Ok(PacketType::Noop),
            _ => Err(Error::MalformedPacket(format!(
                "packet type invalid: {}",
                b as char
            ))),
        }
    }

    fn digit(self) -> u8 {
        b'0' + self as u8
    }
}

/// The handshake payload sent as the single `OPEN` packet at session birth.
#[derive(Debug, Clone, Serialize)]
pub struct OpenPacket {
    pub sid: String,
    #[serde(rename = "pingInterval")]
    pub ping_interval: u64,
    #[serde(rename = "pingTimeout")]
    pub ping_timeout: u64,
    pub upgrades: Vec<String>,
    #[serde(rename = "maxPayload")]
    pub max_payload: u64,
}

impl OpenPacket {
    pub fn new(transport: TransportType, sid: Sid, config: &EngineIoConfig) -> Self {
        Self {
            sid: sid.to_string(),
            ping_interval: config.ping_interval.as_millis() as u64,
            ping_timeout: config.ping_timeout.as_millis() as u64,
            upgrades: crate::transport::manager::TransportManager::default()
                .upgradable(transport)
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            max_payload: config.max_payload as u64,
        }
    }
}

/// One Engine.IO unit: a message type, a packet type, and an (often empty)
/// payload.
#[derive(Debug, Clone)]
pub struct Packet {
    pub mtype: MessageType,
    pub ptype: PacketType,
    pub payload: Bytes,
}

impl Packet {
    pub fn open(transport: TransportType, sid: Sid, config: &EngineIoConfig) -> Self {
        let open = OpenPacket::new(transport, sid, config);
        let json = serde_json::to_vec(&open).expect("OpenPacket always serializes");
        Packet {
            mtype: MessageType::Text,
            ptype: PacketType::Open,
            payload: Bytes::from(json),
        }
    }

    pub fn close() -> Self {
        Packet {
            mtype: MessageType::Text,
            ptype: PacketType::Close,
            payload: Bytes::new(),
        }
    }

    pub fn ping(payload: Bytes) -> Self {
        Packet {
            mtype: MessageType::Text,
            ptype: PacketType::Ping,
            payload,
        }
    }

    pub fn pong(payload: Bytes) -> Self {
        Packet {
            mtype: MessageType::Text,
            ptype: PacketType::Pong,
            payload,
        }
    }

    pub fn message(mtype: MessageType, payload: Bytes) -> Self {
        Packet {
            mtype,
            ptype: PacketType::Message,
            payload,
        }
    }

    pub fn upgrade() -> Self {
        Packet {
            mtype: MessageType::Text,
            ptype: PacketType::Upgrade,
            payload: Bytes::new(),
        }
    }

    pub fn noop() -> Self {
        Packet {
            mtype: MessageType::Text,
            ptype: PacketType::Noop,
            payload: Bytes::new(),
        }
    }
}

/// Encode a packet the way it is carried on the polling transport:
/// `<digit><payload>` for text, raw `payload` for binary (the carrier's
/// framing already says "this body is binary").
pub fn encode_packet(packet: &Packet) -> Bytes {
    match packet.mtype {
        MessageType::Binary => packet.payload.clone(),
        MessageType::Text => {
            let mut buf = Vec::with_capacity(1 + packet.payload.len());
            buf.push(packet.ptype.digit());
            buf.extend_from_slice(&packet.payload);
            Bytes::from(buf)
        }
    }
}

/// Decode one polling-carrier frame: a leading `'b'` marks a binary message
/// packet with no further framing; otherwise the first byte is the ASCII
/// packet-type digit.
pub fn decode_polling_frame(bytes: &[u8]) -> Result<Packet, Error> {
    if bytes.first() == Some(&b'b') {
        return Ok(Packet {
            mtype: MessageType::Binary,
            ptype: PacketType::Message,
            payload: Bytes::copy_from_slice(&bytes[1..]),
        });
    }
    let digit = *bytes
        .first()
        .ok_or_else(|| Error::MalformedPacket("empty packet".into()))?;
    let ptype = PacketType::from_digit(digit)?;
    Ok(Packet {
        mtype: MessageType::Text,
        ptype,
        payload: Bytes::copy_from_slice(&bytes[1..]),
    })
}

/// Encode a packet as a single WebSocket frame: text frames carry
/// `<digit><payload>`, binary frames carry the payload unprefixed with an
/// implicit `MESSAGE` packet type.
impl TryFrom<&Packet> for Message {
    type Error = Error;

    fn try_from(packet: &Packet) -> Result<Self, Self::Error> {
        match packet.mtype {
            MessageType::Binary => Ok(Message::Binary(packet.payload.to_vec())),
            MessageType::Text => {
                let mut buf = Vec::with_capacity(1 + packet.payload.len());
                buf.push(packet.ptype.digit());
                buf.extend_from_slice(&packet.payload);
                let s = String::from_utf8(buf)
                    .map_err(|e| Error::MalformedPacket(e.to_string()))?;
                Ok(Message::Text(s))
            }
        }
    }
}

/// Decode one WebSocket frame into a packet. A binary frame is always a
/// `MESSAGE` packet; a text frame's first byte is the packet-type digit.
pub fn decode_ws_message(msg: Message) -> Result<Packet, Error> {
    match msg {
        Message::Text(s) => {
            let bytes = s.into_bytes();
            let digit = *bytes
                .first()
                .ok_or_else(|| Error::MalformedPacket("empty frame".into()))?;
            let ptype = PacketType::from_digit(digit)?;
            Ok(Packet {
                mtype: MessageType::Text,
                ptype,
                payload: Bytes::copy_from_slice(&bytes[1..]),
            })
        }
        Message::Binary(b) => Ok(Packet {
            mtype: MessageType::Binary,
            ptype: PacketType::Message,
            payload: Bytes::from(b),
        }),
        _ => Err(Error::TransportError("unexpected websocket frame".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decode_rejects_unknown_packet_type() {
        let err = decode_polling_frame(b"9hello").unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }

    #[test]
    fn decode_binary_has_no_packet_type() {
        let packet = decode_polling_frame(b"bhello").unwrap();
        assert_eq!(packet.mtype, MessageType::Binary);
        assert_eq!(packet.ptype, PacketType::Message);
        assert_eq!(&packet.payload[..], b"hello");
    }

    #[test]
    fn encode_decode_message_roundtrip() {
        let packet = Packet::message(MessageType::Text, Bytes::from_static(b"hello"));
        let encoded = encode_packet(&packet);
        assert_eq!(&encoded[..], b"4hello");
        let decoded = decode_polling_frame(&encoded).unwrap();
        assert_eq!(decoded.ptype, PacketType::Message);
        assert_eq!(&decoded.payload[..], b"hello");
    }

    proptest! {
        // Invariant 2: for any valid (TEXT, pt in 0..=6, payload), decoding
        // an encoded packet reproduces it exactly.
        #[test]
        fn roundtrip_text_packets(digit in 0u8..=6, payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let ptype = PacketType::from_digit(b'0' + digit).unwrap();
            let packet = Packet {
                mtype: MessageType::Text,
                ptype,
                payload: Bytes::from(payload.clone()),
            };
            let encoded = encode_packet(&packet);
            let decoded = decode_polling_frame(&encoded).unwrap();
            prop_assert_eq!(decoded.mtype, MessageType::Text);
            prop_assert_eq!(decoded.ptype as u8, ptype as u8);
            prop_assert_eq!(&decoded.payload[..], &payload[..]);
        }

        // Invariant 1: decoding is idempotent under re-encoding, for any
        // byte sequence that decodes successfully the first time.
        //
        // Binary packets are excluded: `encode_packet` deliberately drops the
        // `'b'` marker for binary payloads (the polling GET response signals
        // "binary" via its HTTP content type, not an in-band byte — see
        // `decode_polling_frame`'s doc comment), so encode . decode is not a
        // round trip for that one packet type. This asymmetry exists in
        // `original_source/transport/polling/server.go` too (`Write` always
        // writes a digit prefix; `Read`'s `'b'` handling only applies to
        // client-submitted POST bodies).
        #[test]
        fn decode_encode_decode_is_stable(bytes in proptest::collection::vec(any::<u8>(), 1..64)) {
            if let Ok(first) = decode_polling_frame(&bytes) {
                if first.mtype == MessageType::Binary {
                    return Ok(());
                }
                let reencoded = encode_packet(&first);
                let second = decode_polling_frame(&reencoded).unwrap();
                prop_assert_eq!(first.mtype, second.mtype);
                prop_assert_eq!(first.ptype as u8, second.ptype as u8);
                prop_assert_eq!(&first.payload[..], &second.payload[..]);
            }
        }
    }
}
