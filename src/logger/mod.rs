//! Logger module
//!
//! Structured logging on `tracing`. Everything goes to stderr: a worker's
//! stdout is the replication channel to its parent.

mod format;

pub use format::AccessLogEntry;

use crate::config::Config;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber
///
/// `RUST_LOG` wins over `logging.level` when set. Calling twice is harmless.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!(
        %addr,
        pid = std::process::id(),
        session_ttl_secs = config.sessions.ttl_secs,
        cookie = %config.sessions.cookie_name,
        "worker listening on http://{addr}"
    );
}

pub fn log_supervisor_start(config: &Config) {
    tracing::info!(
        workers = config.server.workers,
        port = config.server.port,
        pid = std::process::id(),
        "supervisor starting worker pool"
    );
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::trace!(%peer_addr, "connection accepted");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::warn!("failed to serve connection: {err:?}");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}
