// Connection handling module
// Serves one TCP connection on the worker's LocalSet

use std::convert::Infallible;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{REFERER, USER_AGENT};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;

use crate::config::LoggingConfig;
use crate::handler::Dispatcher;
use crate::logger::{self, AccessLogEntry};

/// Access log switch and output format
#[derive(Debug, Clone)]
pub struct AccessLog {
    pub enabled: bool,
    pub format: String,
}

impl AccessLog {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.access_log,
            format: config.access_log_format.clone(),
        }
    }

    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            format: String::new(),
        }
    }
}

/// Handle a single connection in a spawned local task.
///
/// The connection is HTTP/1.1 with keep-alive; every request on it goes
/// through the dispatcher.
pub fn serve_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Rc<Dispatcher>,
    access_log: Rc<AccessLog>,
) {
    if access_log.enabled {
        logger::log_connection_accepted(&peer_addr);
    }

    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder.keep_alive(true);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let dispatcher = Rc::clone(&dispatcher);
                let access_log = Rc::clone(&access_log);
                async move {
                    Ok::<_, Infallible>(handle_request(req, peer_addr, &dispatcher, &access_log).await)
                }
            }),
        );

        if let Err(err) = conn.await {
            logger::log_connection_error(&err);
        }
    });
}

/// Dispatch one request and write its access log line
async fn handle_request<B>(
    req: Request<B>,
    peer_addr: SocketAddr,
    dispatcher: &Dispatcher,
    access_log: &AccessLog,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    if !access_log.enabled {
        return dispatcher.dispatch(req).await;
    }

    let start = Instant::now();
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = format!("{:?}", req.version())
        .trim_start_matches("HTTP/")
        .to_string();
    entry.referer = header_text(&req, REFERER);
    entry.user_agent = header_text(&req, USER_AGENT);

    let response = dispatcher.dispatch(req).await;

    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.request_time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    logger::log_access(&entry, &access_log.format);

    response
}

fn header_text<B>(req: &Request<B>, name: hyper::header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}
