//! Per-request handler instance
//!
//! Built fresh from a [`HandlerSpec`](super::HandlerSpec) for each matched
//! request and dropped once the response is produced. The response is
//! buffered; "headers sent" flips on the first body write, an explicit
//! `write_head`, or finalization, and pending `Set-Cookie` values are
//! flushed exactly at that moment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use hyper::http::request::Parts;
use hyper::{Method, Response, StatusCode};
use serde_json::Value;

use super::TemplateEngine;
use crate::config::Config;
use crate::error::{HandlerError, HandlerResult};
use crate::http::{build_handler_response, CookieJar, PostData};
use crate::session::Session;

/// Request parameters exposed to method callbacks
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Route capture groups, index 0 is the whole match
    pub args: Vec<String>,
    /// Query string pairs
    pub get: BTreeMap<String, String>,
    /// Parsed body; empty for GET and HEAD
    pub post: PostData,
}

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    headers_sent: bool,
    finished: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            headers_sent: false,
            finished: false,
        }
    }
}

#[derive(Debug)]
pub struct Handler {
    pub params: Params,
    pub cookies: CookieJar,
    request: Parts,
    response: ResponseState,
    session: Option<Session>,
    directory: Option<PathBuf>,
    templates: Option<TemplateEngine>,
    config: Option<Rc<Config>>,
}

impl Handler {
    pub(crate) fn new(request: Parts, args: Vec<String>, cookies: CookieJar) -> Self {
        Self {
            params: Params {
                args,
                ..Params::default()
            },
            cookies,
            request,
            response: ResponseState::default(),
            session: None,
            directory: None,
            templates: None,
            config: None,
        }
    }

    pub(crate) fn bind_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub(crate) fn set_directory(&mut self, directory: Option<PathBuf>) {
        self.directory = directory;
    }

    pub(crate) fn set_templates(&mut self, templates: Option<TemplateEngine>) {
        self.templates = templates;
    }

    pub(crate) fn set_config(&mut self, config: Option<Rc<Config>>) {
        self.config = config;
    }

    /// Application config the server was started with
    pub fn config(&self) -> Option<&Config> {
        self.config.as_deref()
    }

    /// Request line and headers
    pub const fn request(&self) -> &Parts {
        &self.request
    }

    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Session bound to this request
    ///
    /// Fails with [`HandlerError::SessionsDisabled`] unless the spec
    /// enabled sessions.
    pub fn sessions(&self) -> Result<Session, HandlerError> {
        self.session.clone().ok_or(HandlerError::SessionsDisabled)
    }

    pub const fn status(&self) -> StatusCode {
        self.response.status
    }

    pub const fn headers_sent(&self) -> bool {
        self.response.headers_sent
    }

    pub const fn is_finished(&self) -> bool {
        self.response.finished
    }

    /// Change the status; ignored once headers are sent
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.response.headers_sent {
            self.response.status = status;
        }
    }

    /// Set a response header; returns false once headers are sent or
    /// when the name or value is not valid
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        if self.response.headers_sent {
            return false;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.response.headers.insert(name, value);
                true
            }
            _ => {
                tracing::warn!(header = name, "invalid response header dropped");
                false
            }
        }
    }

    /// Queue a cookie for the next `Set-Cookie` flush
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.set(name, value);
    }

    /// Flush pending cookies into `Set-Cookie` headers
    ///
    /// A no-op once headers are sent.
    pub fn send_cookies(&mut self) {
        if self.response.headers_sent {
            return;
        }
        for value in self.cookies.take_set_cookie_values() {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    self.response.headers.append(SET_COOKIE, value);
                }
                Err(_) => tracing::warn!("cookie value not representable as a header"),
            }
        }
    }

    /// Send status and headers now, flushing cookies first
    pub fn write_head(&mut self, status: StatusCode, headers: &[(&str, &str)]) {
        if self.response.headers_sent {
            tracing::debug!("write_head after headers were sent ignored");
            return;
        }
        self.response.status = status;
        for (name, value) in headers {
            self.set_header(name, value);
        }
        self.send_cookies();
        self.response.headers_sent = true;
    }

    /// Append to the response body
    pub fn write(&mut self, content: impl AsRef<[u8]>) {
        if self.response.finished {
            tracing::debug!("write after end ignored");
            return;
        }
        if !self.response.headers_sent {
            self.send_cookies();
            self.response.headers_sent = true;
        }
        self.response.body.extend_from_slice(content.as_ref());
    }

    /// Write a final chunk and finish the response
    pub fn end(&mut self, content: impl AsRef<[u8]>) {
        self.write(content);
        self.response.finished = true;
    }

    /// Render `template` under the template root and end with the result
    ///
    /// The app config is exposed to the template as `config` unless the
    /// context already has that key.
    pub fn render(&mut self, template: &str, context: &Value) -> HandlerResult {
        let engine = self.templates.as_ref().ok_or(HandlerError::NoTemplateEngine)?;
        let config = self
            .config
            .as_deref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| HandlerError::Render(e.to_string()))?;
        let body = engine
            .render(template, context, config.as_ref())
            .map_err(HandlerError::Render)?;
        self.end(body);
        Ok(())
    }

    /// Finalize into a response, flushing cookies if nothing was sent yet
    pub(crate) fn into_response(mut self) -> Response<Full<Bytes>> {
        self.send_cookies();
        self.response.headers_sent = true;

        let body = if self.request.method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(self.response.body)
        };
        build_handler_response(self.response.status, self.response.headers, body)
    }
}
