//! Session module
//!
//! One [`SessionStore`] per process, created at startup and shared by the
//! dispatcher, the sweeper and the replication inbound loop.

mod store;
mod sweep;

pub use store::{Session, SessionMap, SessionRecord, SessionStore};
pub use sweep::run_sweeper;

/// Default sliding expiration window
pub const DEFAULT_TTL_SECS: u64 = 1800;

/// Default name of the cookie carrying the session identifier
pub const DEFAULT_COOKIE_NAME: &str = "SESSID";

/// Wall clock in milliseconds since the Unix epoch
///
/// Expiry is absolute wall time so records stay meaningful across processes.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
