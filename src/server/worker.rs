//! Worker process role
//!
//! One worker is one event loop: its own session store, its own listener
//! on the shared port, and one replication transport.

use std::rc::Rc;

use super::connection::AccessLog;
use super::listener::create_reusable_listener;
use super::server_loop::start_server_loop;
use crate::config::Config;
use crate::error::ServerError;
use crate::handler::{Dispatcher, TemplateEngine};
use crate::logger;
use crate::replication;
use crate::routing::RouteTable;
use crate::session::{run_sweeper, SessionStore};

/// Where replication messages go once they leave the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// No parent: messages are applied straight back to the local store
    Loopback,
    /// Spawned by a supervisor: stdout carries messages up, stdin brings
    /// fanned-out messages down
    Parent,
}

/// Run one worker until shutdown; must be called inside a `LocalSet`
pub async fn run_worker(
    config: &Config,
    routes: RouteTable,
    templates: Option<TemplateEngine>,
    transport: Transport,
) -> Result<(), ServerError> {
    let (sender, outbound) = replication::channel(config.replication.channel_capacity);
    let store = Rc::new(SessionStore::new(&config.sessions, sender));

    match transport {
        Transport::Loopback => {
            tokio::task::spawn_local(replication::loopback(outbound, Rc::clone(&store)));
        }
        Transport::Parent => {
            tokio::task::spawn_local(replication::forward_outbound(
                outbound,
                tokio::io::stdout(),
            ));
            tokio::task::spawn_local(replication::apply_inbound(
                tokio::io::stdin(),
                Rc::clone(&store),
            ));
        }
    }
    tokio::task::spawn_local(run_sweeper(
        Rc::clone(&store),
        config.sessions.sweep_interval(),
    ));

    let addr = config
        .get_socket_addr()
        .map_err(ServerError::InvalidAddress)?;
    let listener = create_reusable_listener(addr, config.server.backlog)?;
    logger::log_server_start(&listener.local_addr()?, config);

    let dispatcher = Rc::new(
        Dispatcher::new(routes, store)
            .with_templates(templates)
            .with_config(Rc::new(config.clone())),
    );
    let access_log = Rc::new(AccessLog::from_config(&config.logging));
    start_server_loop(listener, dispatcher, access_log).await;
    Ok(())
}
