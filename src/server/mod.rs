// Server module entry point
// Builds the route table, picks the process role and runs it on a LocalSet

pub mod connection;
pub mod listener;
pub mod signal;
pub mod worker;

// `loop` is a keyword, so the module is renamed
#[path = "loop.rs"]
pub mod server_loop;

use std::ffi::OsStr;

pub use connection::AccessLog;
pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;
pub use worker::{run_worker, Transport};

use crate::cluster::{self, WORKER_ENV};
use crate::config::Config;
use crate::error::{RouteError, ServerError};
use crate::handler::{HandlerSpec, Renderer, TemplateEngine};
use crate::routing::RouteTable;

/// What this process does once `serve` runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Single process with loopback replication
    Standalone,
    /// Parent of a worker pool; serves no requests itself
    Supervisor,
    /// Child spawned by a supervisor
    Worker,
}

impl Role {
    pub fn detect(worker_env: Option<&OsStr>, config: &Config) -> Self {
        if worker_env.is_some() {
            Self::Worker
        } else if config.server.is_pool() {
            Self::Supervisor
        } else {
            Self::Standalone
        }
    }
}

/// Application server: handlers are added in priority order, then `serve`
pub struct Server {
    config: Config,
    routes: RouteTable,
    templates: Option<TemplateEngine>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
            templates: None,
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Append a handler; earlier handlers win on overlapping routes
    pub fn add_handler(&mut self, spec: HandlerSpec) -> Result<(), RouteError> {
        self.routes.register(spec)
    }

    /// Install the template renderer; names resolve under `templates`
    /// from the config, or `templates/` when unset
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        let root = self
            .config
            .templates
            .clone()
            .unwrap_or_else(|| "templates".to_string());
        self.templates = Some(TemplateEngine::new(renderer, root));
        self
    }

    /// Register the configured static directories after all handlers
    fn register_statics(&mut self) -> Result<(), RouteError> {
        for (prefix, directory) in &self.config.statics {
            self.routes
                .register(HandlerSpec::static_dir(Some(prefix.as_str()), directory))?;
        }
        Ok(())
    }

    /// Run until shutdown on a single-threaded runtime
    pub fn serve(self) -> Result<(), ServerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = tokio::task::LocalSet::new();
        runtime.block_on(local.run_until(self.run()))
    }

    async fn run(mut self) -> Result<(), ServerError> {
        let role = Role::detect(std::env::var_os(WORKER_ENV).as_deref(), &self.config);
        tracing::debug!(?role, "process role selected");

        match role {
            Role::Supervisor => cluster::run_supervisor(&self.config).await,
            Role::Worker | Role::Standalone => {
                self.register_statics()?;
                let transport = if role == Role::Worker {
                    Transport::Parent
                } else {
                    Transport::Loopback
                };
                run_worker(&self.config, self.routes, self.templates, transport).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::load_from("definitely/not/here").unwrap()
    }

    #[test]
    fn test_role_detection() {
        let mut cfg = config();
        assert_eq!(Role::detect(None, &cfg), Role::Standalone);

        cfg.server.workers = 4;
        assert_eq!(Role::detect(None, &cfg), Role::Supervisor);
        assert_eq!(Role::detect(Some(OsStr::new("2")), &cfg), Role::Worker);
    }

    #[test]
    fn test_invalid_route_rejected() {
        let mut server = Server::new(config());
        let err = server.add_handler(HandlerSpec::new("^/(unclosed")).unwrap_err();
        assert!(err.to_string().contains("^/(unclosed"));
        assert!(server.add_handler(HandlerSpec::new("^/fine")).is_ok());
    }

    #[test]
    fn test_statics_registered_after_handlers() {
        let mut cfg = config();
        cfg.statics.insert("assets".to_string(), "public".to_string());
        let mut server = Server::new(cfg);
        server
            .add_handler(HandlerSpec::new("^/assets/special").get(|h| {
                h.end("mine");
                Ok(())
            }))
            .unwrap();
        server.register_statics().unwrap();

        assert_eq!(server.routes.len(), 2);
        let matched = server.routes.resolve("/assets/special", "GET").unwrap();
        assert_eq!(matched.spec.route(), "^/assets/special");
        let matched = server.routes.resolve("/assets/app.js", "GET").unwrap();
        assert_eq!(matched.spec.route(), "^/assets/(.*)");
    }

    #[test]
    fn test_renderer_root_from_config() {
        let mut cfg = config();
        cfg.templates = Some("views".to_string());
        let server = Server::new(cfg).with_renderer(
            |_: &std::path::Path, _: &serde_json::Value| -> Result<String, String> {
                Ok(String::new())
            },
        );
        let engine = server.templates.as_ref().unwrap();
        assert_eq!(engine.root(), std::path::Path::new("views"));
    }
}
