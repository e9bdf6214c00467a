// Configuration module entry point
// Layers config file, environment and built-in defaults

mod types;

use std::net::SocketAddr;

pub use types::{Config, LoggingConfig, ReplicationConfig, ServerConfig, SessionConfig};

/// Default config file name (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Environment variable prefix, e.g. `KNOTTER_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "KNOTTER";

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("server.workers", 1)?
            .set_default("server.backlog", 128)?
            .set_default("sessions.ttl_secs", crate::session::DEFAULT_TTL_SECS)?
            .set_default("sessions.cookie_name", crate::session::DEFAULT_COOKIE_NAME)?
            .set_default("sessions.sweep_interval_ms", 1000)?
            .set_default("replication.channel_capacity", 256)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
