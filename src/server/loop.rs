// Server loop module
// Accepts connections until a shutdown signal arrives

use std::rc::Rc;

use tokio::net::TcpListener;

use super::connection::{serve_connection, AccessLog};
use super::signal::wait_for_shutdown;
use crate::handler::Dispatcher;
use crate::logger;

/// Accept loop for one worker
///
/// In-flight connections are not drained; they end when the `LocalSet`
/// is dropped.
pub async fn start_server_loop(
    listener: TcpListener,
    dispatcher: Rc<Dispatcher>,
    access_log: Rc<AccessLog>,
) {
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        serve_connection(
                            stream,
                            peer_addr,
                            Rc::clone(&dispatcher),
                            Rc::clone(&access_log),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = &mut shutdown => {
                tracing::info!(pid = std::process::id(), "worker stopping");
                return;
            }
        }
    }
}
