//! The response body type every handler in this crate returns: either a
//! fully-buffered byte payload (handshake, polling GET/POST, error bodies)
//! or a pass-through of the inbound request body's type, needed only so
//! the `tower::Service`'s associated `ResBody` type can be a single
//! concrete type regardless of which branch of the dispatcher ran.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::Body;
use pin_project::pin_project;

use crate::errors::Error;

/// Buffers an inbound request body up to `limit` bytes, rejecting anything
/// larger the way `original_source/transport/polling/server.go`'s `onData`
/// bounds a POST body by `maxPayload`.
pub(crate) async fn collect_bounded<B>(mut body: B, limit: usize) -> Result<Bytes, Error>
where
    B: Body + Unpin,
    B::Data: Into<Bytes>,
    B::Error: std::fmt::Display,
{
    let mut buf = BytesMut::new();
    while let Some(chunk) = body
        .data()
        .await
        .transpose()
        .map_err(|e| Error::TransportError(e.to_string()))?
    {
        let chunk = chunk.into();
        if buf.len() + chunk.len() > limit {
            return Err(Error::MalformedPacket("payload exceeds maxPayload".into()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[pin_project(project = ResponseBodyProj)]
pub enum ResponseBody<B> {
    Empty,
    Bytes(#[pin] http_body::Full<Bytes>),
    Original(#[pin] B),
}

impl<B> ResponseBody<B> {
    pub fn empty() -> Self {
        ResponseBody::Empty
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        ResponseBody::Bytes(http_body::Full::new(data.into()))
    }
}

impl<B> Body for ResponseBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = crate::errors::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        match self.project() {
            ResponseBodyProj::Empty => Poll::Ready(None),
            ResponseBodyProj::Bytes(b) => b.poll_data(cx).map_err(|never| match never {}),
            ResponseBodyProj::Original(b) => b
                .poll_data(cx)
                .map_err(|e| crate::errors::Error::TransportError(e.to_string())),
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<http::HeaderMap>, Self::Error>> {
        match self.project() {
            ResponseBodyProj::Empty => Poll::Ready(Ok(None)),
            ResponseBodyProj::Bytes(b) => b.poll_trailers(cx).map_err(|never| match never {}),
            ResponseBodyProj::Original(b) => b
                .poll_trailers(cx)
                .map_err(|e| crate::errors::Error::TransportError(e.to_string())),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ResponseBody::Empty => true,
            ResponseBody::Bytes(b) => b.is_end_stream(),
            ResponseBody::Original(b) => b.is_end_stream(),
        }
    }
}
