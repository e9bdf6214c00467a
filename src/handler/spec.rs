//! Handler specs: the immutable per-route template
//!
//! A spec carries a route pattern and an optional callback per HTTP
//! method. Dispatch checks which callbacks are present; a fresh
//! [`Handler`] is built from the spec for every matched request.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;

use super::Handler;
use crate::error::HandlerResult;

/// Boxed, non-`Send` future returned by async method callbacks
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

type SyncFn = dyn Fn(&mut Handler) -> HandlerResult;
type AsyncFn = dyn for<'a> Fn(&'a mut Handler) -> BoxFuture<'a, HandlerResult>;

/// Methods a spec can implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HandlerMethod {
    /// Parse a method name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Get, Self::Post, Self::Put, Self::Delete, Self::Head]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }

    /// Whether the request body is drained and parsed before invocation
    pub const fn carries_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method callback, synchronous or async
#[derive(Clone)]
pub enum MethodCallback {
    Sync(Rc<SyncFn>),
    Async(Rc<AsyncFn>),
}

impl MethodCallback {
    pub async fn invoke(&self, handler: &mut Handler) -> HandlerResult {
        match self {
            Self::Sync(f) => f(handler),
            Self::Async(f) => f(handler).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct HandlerSpec {
    route: String,
    use_sessions: bool,
    directory: Option<PathBuf>,
    get: Option<MethodCallback>,
    post: Option<MethodCallback>,
    put: Option<MethodCallback>,
    delete: Option<MethodCallback>,
    head: Option<MethodCallback>,
}

impl HandlerSpec {
    /// Spec for a route regex, matched against the request path only
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn use_sessions(mut self, enabled: bool) -> Self {
        self.use_sessions = enabled;
        self
    }

    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    #[must_use]
    pub fn on<F>(mut self, method: HandlerMethod, f: F) -> Self
    where
        F: Fn(&mut Handler) -> HandlerResult + 'static,
    {
        *self.slot_mut(method) = Some(MethodCallback::Sync(Rc::new(f)));
        self
    }

    #[must_use]
    pub fn on_async<F>(mut self, method: HandlerMethod, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Handler) -> BoxFuture<'a, HandlerResult> + 'static,
    {
        *self.slot_mut(method) = Some(MethodCallback::Async(Rc::new(f)));
        self
    }

    #[must_use]
    pub fn get<F>(self, f: F) -> Self
    where
        F: Fn(&mut Handler) -> HandlerResult + 'static,
    {
        self.on(HandlerMethod::Get, f)
    }

    #[must_use]
    pub fn post<F>(self, f: F) -> Self
    where
        F: Fn(&mut Handler) -> HandlerResult + 'static,
    {
        self.on(HandlerMethod::Post, f)
    }

    #[must_use]
    pub fn put<F>(self, f: F) -> Self
    where
        F: Fn(&mut Handler) -> HandlerResult + 'static,
    {
        self.on(HandlerMethod::Put, f)
    }

    #[must_use]
    pub fn delete<F>(self, f: F) -> Self
    where
        F: Fn(&mut Handler) -> HandlerResult + 'static,
    {
        self.on(HandlerMethod::Delete, f)
    }

    #[must_use]
    pub fn head<F>(self, f: F) -> Self
    where
        F: Fn(&mut Handler) -> HandlerResult + 'static,
    {
        self.on(HandlerMethod::Head, f)
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub const fn uses_sessions(&self) -> bool {
        self.use_sessions
    }

    pub fn directory_path(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub const fn callback(&self, method: HandlerMethod) -> Option<&MethodCallback> {
        match method {
            HandlerMethod::Get => self.get.as_ref(),
            HandlerMethod::Post => self.post.as_ref(),
            HandlerMethod::Put => self.put.as_ref(),
            HandlerMethod::Delete => self.delete.as_ref(),
            HandlerMethod::Head => self.head.as_ref(),
        }
    }

    pub const fn handles(&self, method: HandlerMethod) -> bool {
        self.callback(method).is_some()
    }

    fn slot_mut(&mut self, method: HandlerMethod) -> &mut Option<MethodCallback> {
        match method {
            HandlerMethod::Get => &mut self.get,
            HandlerMethod::Post => &mut self.post,
            HandlerMethod::Put => &mut self.put,
            HandlerMethod::Delete => &mut self.delete,
            HandlerMethod::Head => &mut self.head,
        }
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<_> = [
            HandlerMethod::Get,
            HandlerMethod::Post,
            HandlerMethod::Put,
            HandlerMethod::Delete,
            HandlerMethod::Head,
        ]
        .into_iter()
        .filter(|m| self.handles(*m))
        .collect();

        f.debug_struct("HandlerSpec")
            .field("route", &self.route)
            .field("use_sessions", &self.use_sessions)
            .field("directory", &self.directory)
            .field("methods", &methods)
            .finish()
    }
}
