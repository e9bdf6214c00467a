//! Error types
//!
//! Routing misses and malformed input never become errors; these cover
//! setup failures and mistakes made by handler code.

use thiserror::Error;

/// Route registration failure
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern '{route}': {source}")]
    InvalidPattern {
        route: String,
        #[source]
        source: regex::Error,
    },
}

/// Error raised from inside a handler method
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The matched handler spec did not enable sessions
    #[error("sessions not activated for this handler")]
    SessionsDisabled,

    #[error("no configured template engine")]
    NoTemplateEngine,

    #[error("template rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type returned by handler method callbacks
pub type HandlerResult = Result<(), HandlerError>;

/// Startup and process management failures
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
