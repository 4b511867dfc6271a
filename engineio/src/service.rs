//! The single HTTP entry point: parses the Engine.IO query string and
//! routes to handshake, long-poll, POST, or upgrade handling. Grounded in
//! `original_source/server.go`'s `ServeHTTP` (the decision table is a
//! direct translation) and the teacher's choice of `tower::Service` as the
//! integration seam.

use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Method, Request, Response};
use tower::Service;

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::{DisconnectReason, EngineIoHandler};
use crate::res::error_response;
use crate::sid::Sid;
use crate::transport::{self, TransportType};

/// A `tower::Service` that terminates every request under
/// [`EngineIoConfig::req_path`][crate::config::EngineIoConfig::req_path]
/// and answers everything else with `404`.
pub struct EngineIoService<H: EngineIoHandler> {
    engine: Arc<EngineIo<H>>,
}

impl<H: EngineIoHandler> Clone for EngineIoService<H> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<H: EngineIoHandler> EngineIoService<H> {
    pub fn new(handler: H, config: crate::config::EngineIoConfig) -> Self {
        Self {
            engine: EngineIo::new(handler, config),
        }
    }

    pub fn engine(&self) -> &Arc<EngineIo<H>> {
        &self.engine
    }
}

#[derive(Default)]
struct Query {
    eio: Option<String>,
    transport: Option<String>,
    sid: Option<String>,
}

/// A deliberately small query-string splitter: the only parameters this
/// protocol ever needs are `EIO`, `transport`, and `sid`.
fn parse_query(raw: &str) -> Query {
    let mut q = Query::default();
    for pair in raw.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default().to_string();
        match key {
            "EIO" => q.eio = Some(value),
            "transport" => q.transport = Some(value),
            "sid" => q.sid = Some(value),
            _ => {}
        }
    }
    q
}

impl<H, ReqBody> Service<Request<ReqBody>> for EngineIoService<H>
where
    H: EngineIoHandler,
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ReqBody::Data: Into<bytes::Bytes> + Send,
    ReqBody::Error: std::fmt::Display,
{
    type Response = Response<ResponseBody<ReqBody>>;
    type Error = Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let engine = self.engine.clone();
        Box::pin(async move {
            match dispatch(engine.clone(), req).await {
                Ok(resp) => Ok(resp),
                Err(e) => error_response(&e),
            }
        })
    }
}

async fn dispatch<H, ReqBody>(
    engine: Arc<EngineIo<H>>,
    req: Request<ReqBody>,
) -> Result<Response<ResponseBody<ReqBody>>, Error>
where
    H: EngineIoHandler,
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ReqBody::Data: Into<bytes::Bytes> + Send,
    ReqBody::Error: std::fmt::Display,
{
    if req.uri().path() != engine.config.req_path {
        return Err(Error::BadHandshake(format!(
            "unknown path {}",
            req.uri().path()
        )));
    }

    let query = parse_query(req.uri().query().unwrap_or_default());
    if query.eio.as_deref() != Some("4") {
        return Err(Error::BadHandshake(format!(
            "invalid EIO={:?}",
            query.eio
        )));
    }
    let requested: TransportType = query
        .transport
        .as_deref()
        .ok_or_else(|| Error::BadHandshake("missing transport".into()))?
        .parse()?;

    match query.sid {
        None => match (req.method(), requested) {
            (&Method::GET, TransportType::Polling) => {
                transport::polling::open_req(engine).await
            }
            (&Method::GET, TransportType::Websocket) => {
                transport::ws::open_req(engine, req).await
            }
            _ => Err(Error::BadHandshake(format!(
                "{} not valid for a new session",
                req.method()
            ))),
        },
        Some(sid) => {
            let sid: Sid = sid
                .parse()
                .map_err(|_| Error::BadHandshake(format!("malformed sid {sid}")))?;
            route_existing(engine, sid, requested, req).await
        }
    }
}

async fn route_existing<H, ReqBody>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    requested: TransportType,
    req: Request<ReqBody>,
) -> Result<Response<ResponseBody<ReqBody>>, Error>
where
    H: EngineIoHandler,
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ReqBody::Data: Into<bytes::Bytes> + Send,
    ReqBody::Error: std::fmt::Display,
{
    let socket = engine
        .get_socket(sid)
        .ok_or(Error::UnknownSessionId(sid))?;

    let current = socket.transport().await;
    if requested != current {
        return if engine.transports.can_upgrade(current, requested) {
            transport::ws::upgrade_req(engine, sid, req).await
        } else {
            Err(Error::BadHandshake(format!(
                "cannot upgrade {current} to {requested}"
            )))
        };
    }

    let guard = socket.try_lock_method(req.method()).await;
    let guard = match guard {
        Some(g) => g,
        None => {
            engine
                .close_session(sid, DisconnectReason::MultipleHttpPollingError)
                .await;
            return Err(Error::DuplicateRequest);
        }
    };

    let response = match (req.method(), current) {
        (&Method::GET, TransportType::Polling) => {
            transport::polling::polling_req(engine, sid).await
        }
        (&Method::POST, TransportType::Polling) => {
            transport::polling::post_req(engine.clone(), sid, req, engine.config.max_payload)
                .await
        }
        _ => Err(Error::BadHandshake(format!(
            "{} not valid on an established {} session",
            req.method(),
            current
        ))),
    };
    drop(guard);
    response
}
