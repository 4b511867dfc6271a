//! Small helpers for building the `http::Response`s the dispatcher and
//! carriers return. Named to avoid shadowing the `futures` crate import
//! used throughout the carrier modules.

use base64::Engine;
use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode};
use sha1::{Digest, Sha1};

use crate::body::ResponseBody;
use crate::errors::Error;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// A plain text/binary HTTP response carrying one packet or an `"ok"`
/// acknowledgement.
pub fn http_response<B>(
    status: StatusCode,
    body: impl Into<Bytes>,
    is_binary: bool,
) -> Result<Response<ResponseBody<B>>, Error> {
    let content_type = if is_binary {
        "application/octet-stream"
    } else {
        "text/plain; charset=UTF-8"
    };
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, content_type)
        .body(ResponseBody::bytes(body))
        .map_err(Error::Http)
}

/// The `400 Bad Request` response for a protocol violation, carrying the
/// error message as plain text.
pub fn error_response<B>(err: &Error) -> Result<Response<ResponseBody<B>>, Error> {
    http_response(err.status_code(), err.to_string(), false)
}

/// Computes `Sec-WebSocket-Accept` and builds the `101 Switching Protocols`
/// response that hands the connection off to `hyper::upgrade::on`.
pub fn ws_response<B>(ws_key: &HeaderValue) -> Result<Response<ResponseBody<B>>, Error> {
    let accept = derive_accept_key(ws_key.as_bytes());
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::CONNECTION, "Upgrade")
        .header(http::header::UPGRADE, "websocket")
        .header("Sec-WebSocket-Accept", accept)
        .body(ResponseBody::empty())
        .map_err(Error::Http)
}

fn derive_accept_key(request_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(request_key);
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // RFC 6455 §1.3 worked example.
        let key = HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(
            derive_accept_key(key.as_bytes()),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
