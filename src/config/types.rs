// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub replication: ReplicationConfig,
    pub logging: LoggingConfig,
    /// Static directories keyed by route prefix
    #[serde(default)]
    pub statics: BTreeMap<String, String>,
    /// Template root handed to the renderer, if any
    #[serde(default)]
    pub templates: Option<String>,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Worker processes sharing the port; 0 or 1 runs standalone
    pub workers: usize,
    pub backlog: i32,
}

impl ServerConfig {
    pub const fn is_pool(&self) -> bool {
        self.workers > 1
    }
}

/// Session store configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Sliding expiration window
    pub ttl_secs: u64,
    pub cookie_name: String,
    pub sweep_interval_ms: u64,
}

impl SessionConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: crate::session::DEFAULT_TTL_SECS,
            cookie_name: crate::session::DEFAULT_COOKIE_NAME.to_string(),
            sweep_interval_ms: 1000,
        }
    }
}

/// Replication channel configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReplicationConfig {
    /// Outbound queue bound; messages beyond it are dropped
    pub channel_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}
