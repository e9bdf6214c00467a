//! Request dispatch
//!
//! Drives one request through its lifecycle, strictly in order:
//! `Received → Matched → CookiesParsed → SessionBound → BodyParsed →
//! MethodInvoked → ResponseFinalized`, or `NotFound` when no route fits.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{CONTENT_TYPE, COOKIE};
use hyper::{Request, Response};

use super::{Handler, TemplateEngine};
use crate::config::Config;
use crate::http::{self, CookieJar};
use crate::routing::RouteTable;
use crate::session::SessionStore;

/// Lifecycle stage of a request, for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Matched,
    CookiesParsed,
    SessionBound,
    BodyParsed,
    MethodInvoked,
    ResponseFinalized,
    NotFound,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Dispatcher {
    routes: RouteTable,
    sessions: Rc<SessionStore>,
    templates: Option<TemplateEngine>,
    config: Option<Rc<Config>>,
}

impl Dispatcher {
    pub const fn new(routes: RouteTable, sessions: Rc<SessionStore>) -> Self {
        Self {
            routes,
            sessions,
            templates: None,
            config: None,
        }
    }

    #[must_use]
    pub fn with_templates(mut self, templates: Option<TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    /// App config exposed to every handler through `Handler::config`
    #[must_use]
    pub fn with_config(mut self, config: Rc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub const fn sessions(&self) -> &Rc<SessionStore> {
        &self.sessions
    }

    /// Dispatch one request; routing misses become an empty 404
    pub async fn dispatch<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        trace_stage(Stage::Received, &path);

        let Some(matched) = self.routes.resolve(&path, parts.method.as_str()) else {
            trace_stage(Stage::NotFound, &path);
            return http::build_404_response();
        };
        trace_stage(Stage::Matched, &path);
        let spec = matched.spec;
        let method = matched.method;

        let cookies = CookieJar::parse(
            parts
                .headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let query = http::parse_query(parts.uri.query());

        let mut handler = Handler::new(parts, matched.args, cookies);
        handler.params.get = query;
        handler.set_directory(spec.directory_path().map(Path::to_path_buf));
        handler.set_templates(self.templates.clone());
        handler.set_config(self.config.clone());
        trace_stage(Stage::CookiesParsed, &path);

        if spec.uses_sessions() {
            let session = self.sessions.bind(&mut handler.cookies);
            handler.bind_session(session);
        }
        trace_stage(Stage::SessionBound, &path);

        if method.carries_body() {
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::warn!(%path, "failed to read request body: {e}");
                    Bytes::new()
                }
            };
            handler.params.post = http::parse_body(content_type.as_deref(), &bytes);
        }
        trace_stage(Stage::BodyParsed, &path);

        if let Some(callback) = spec.callback(method) {
            if let Err(e) = callback.invoke(&mut handler).await {
                tracing::error!(%path, %method, "handler failed: {e}");
                if !handler.headers_sent() {
                    return http::build_500_response();
                }
            }
        }
        trace_stage(Stage::MethodInvoked, &path);

        let response = handler.into_response();
        trace_stage(Stage::ResponseFinalized, &path);
        response
    }
}

fn trace_stage(stage: Stage, path: &str) {
    tracing::trace!(%stage, path, "request lifecycle");
}
