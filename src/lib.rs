//! knotter
//!
//! A small HTTP application server: regex routes mapped to handler specs,
//! per-request handler instances, cookie-bound sessions with a sliding
//! TTL, and session replication across sibling worker processes sharing
//! one port.

pub mod cluster;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod replication;
pub mod routing;
pub mod server;
pub mod session;

pub use crate::config::Config;
pub use error::{HandlerError, HandlerResult, RouteError, ServerError};
pub use handler::{Handler, HandlerMethod, HandlerSpec};
pub use server::Server;
