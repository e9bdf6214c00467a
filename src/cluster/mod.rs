//! Worker pool supervision
//!
//! The parent process binds nothing. It spawns `server.workers` copies of
//! the current executable, each with piped stdin/stdout, and relays every
//! replication message a worker writes to all workers, the sender
//! included. Workers that exit are dropped from the pool and not
//! respawned.

use std::cell::RefCell;
use std::process::Stdio;
use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::ServerError;
use crate::logger;
use crate::replication::ReplicationMessage;
use crate::server::signal::wait_for_shutdown;

/// Set on spawned workers; its value is the worker index
pub const WORKER_ENV: &str = "KNOTTER_WORKER";

struct WorkerLink {
    id: usize,
    tx: mpsc::Sender<String>,
}

/// Live workers and the queues feeding their stdin
#[derive(Default)]
pub struct WorkerPool {
    links: RefCell<Vec<WorkerLink>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker and get the queue of lines destined for it
    pub fn add_worker(&self, id: usize, capacity: usize) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.links.borrow_mut().push(WorkerLink { id, tx });
        rx
    }

    pub fn remove_worker(&self, id: usize) -> bool {
        let mut links = self.links.borrow_mut();
        let before = links.len();
        links.retain(|link| link.id != id);
        links.len() != before
    }

    pub fn len(&self) -> usize {
        self.links.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.borrow().is_empty()
    }

    /// Queue `message` for every worker; returns how many accepted it
    pub fn fan_out(&self, message: &ReplicationMessage) -> usize {
        let line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to encode replication message: {e}");
                return 0;
            }
        };

        let links = self.links.borrow();
        let mut delivered = 0;
        for link in links.iter() {
            match link.tx.try_send(line.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(worker = link.id, "worker queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(worker = link.id, "worker gone, message dropped");
                }
            }
        }
        delivered
    }
}

/// Read a worker's stdout and fan each message out to the pool
pub async fn relay<R>(pool: Rc<WorkerPool>, id: usize, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(message) = ReplicationMessage::decode(&line) {
                    let delivered = pool.fan_out(&message);
                    tracing::trace!(worker = id, delivered, "replication message relayed");
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(worker = id, "failed to read from worker: {e}");
                return;
            }
        }
    }
}

/// Write queued lines to a worker's stdin until the queue or pipe closes
pub async fn feed_worker<W>(mut queue: mpsc::Receiver<String>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = queue.recv().await {
        line.push('\n');
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!("worker stdin closed: {e}");
            return;
        }
    }
}

/// Spawn the pool and supervise it until every worker exits or a
/// shutdown signal arrives; must be called inside a `LocalSet`
pub async fn run_supervisor(config: &Config) -> Result<(), ServerError> {
    logger::log_supervisor_start(config);

    let exe = std::env::current_exe()?;
    let args: Vec<_> = std::env::args_os().skip(1).collect();
    let capacity = config.replication.channel_capacity;
    let pool = Rc::new(WorkerPool::new());
    let mut waiters = JoinSet::new();

    for index in 0..config.server.workers {
        let mut child = Command::new(&exe)
            .args(&args)
            .env(WORKER_ENV, index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServerError::Spawn { index, source })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ServerError::Spawn {
                index,
                source: std::io::Error::other("worker pipes unavailable"),
            });
        };

        let queue = pool.add_worker(index, capacity);
        tokio::task::spawn_local(feed_worker(queue, stdin));
        tokio::task::spawn_local(relay(Rc::clone(&pool), index, stdout));

        let pool = Rc::clone(&pool);
        tracing::info!(worker = index, pid = child.id(), "worker spawned");
        waiters.spawn_local(async move {
            match child.wait().await {
                Ok(status) => tracing::warn!(worker = index, %status, "worker exited"),
                Err(e) => tracing::error!(worker = index, "failed to wait on worker: {e}"),
            }
            pool.remove_worker(index);
        });
    }

    tokio::select! {
        () = async { while waiters.join_next().await.is_some() {} } => {
            tracing::warn!("all workers exited");
        }
        () = wait_for_shutdown() => {
            tracing::info!(workers = pool.len(), "stopping worker pool");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{self, apply_inbound, forward_outbound};
    use crate::session::{SessionMap, SessionRecord, SessionStore};
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn expire(uid: &str) -> ReplicationMessage {
        ReplicationMessage::Expire {
            uid: uid.to_string(),
        }
    }

    #[test]
    fn test_fan_out_reaches_every_worker() {
        let pool = WorkerPool::new();
        let mut a = pool.add_worker(0, 4);
        let mut b = pool.add_worker(1, 4);

        assert_eq!(pool.fan_out(&expire("x")), 2);
        let line_a = a.try_recv().unwrap();
        let line_b = b.try_recv().unwrap();
        assert_eq!(line_a, line_b);
        assert!(matches!(
            ReplicationMessage::decode(&line_a),
            Some(ReplicationMessage::Expire { uid }) if uid == "x"
        ));
    }

    #[test]
    fn test_removed_worker_gets_nothing() {
        let pool = WorkerPool::new();
        let _a = pool.add_worker(0, 4);
        let mut b = pool.add_worker(1, 4);

        assert!(pool.remove_worker(1));
        assert!(!pool.remove_worker(1));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.fan_out(&expire("x")), 1);
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let pool = WorkerPool::new();
        let _a = pool.add_worker(0, 1);

        assert_eq!(pool.fan_out(&expire("one")), 1);
        assert_eq!(pool.fan_out(&expire("two")), 0);
    }

    #[tokio::test]
    async fn test_relay_fans_out_including_sender() {
        let pool = Rc::new(WorkerPool::new());
        let mut own = pool.add_worker(0, 8);
        let mut sibling = pool.add_worker(1, 8);

        let mut session = SessionMap::new();
        session.insert("abc".to_string(), SessionRecord::new(42));
        let sync = ReplicationMessage::Sync { session }.encode().unwrap();
        let input = format!(
            "{sync}\nnot json\n{{\"message\":\"session:delexpires\",\"uid\":\"abc\"}}\n"
        );

        relay(Rc::clone(&pool), 0, input.as_bytes()).await;

        for queue in [&mut own, &mut sibling] {
            let first = ReplicationMessage::decode(&queue.recv().await.unwrap()).unwrap();
            assert!(matches!(first, ReplicationMessage::Sync { .. }));
            let second = queue.recv().await.unwrap();
            assert!(second.contains("\"session:expires\""));
            assert!(queue.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_feed_worker_writes_lines() {
        let (tx, rx) = mpsc::channel(4);
        let (writer, mut reader) = tokio::io::duplex(1024);

        tx.send("one".to_string()).await.unwrap();
        tx.send("two".to_string()).await.unwrap();
        drop(tx);
        feed_worker(rx, writer).await;

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "one\ntwo\n");
    }

    /// Wire a store to the pool the way a spawned worker is wired, with
    /// in-memory pipes standing in for its stdout and stdin
    fn attach_worker(pool: &Rc<WorkerPool>, id: usize) -> Rc<SessionStore> {
        let (sender, outbound) = replication::channel(16);
        let store = Rc::new(SessionStore::with_window(
            Duration::from_secs(60),
            "SESSID",
            sender,
        ));

        let (up_writer, up_reader) = tokio::io::duplex(64 * 1024);
        tokio::task::spawn_local(forward_outbound(outbound, up_writer));
        tokio::task::spawn_local(relay(Rc::clone(pool), id, up_reader));

        let queue = pool.add_worker(id, 16);
        let (down_writer, down_reader) = tokio::io::duplex(64 * 1024);
        tokio::task::spawn_local(feed_worker(queue, down_writer));
        tokio::task::spawn_local(apply_inbound(down_reader, Rc::clone(&store)));
        store
    }

    async fn settle_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        done()
    }

    #[tokio::test]
    async fn test_sessions_replicate_between_workers() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let pool = Rc::new(WorkerPool::new());
                let a = attach_worker(&pool, 0);
                let b = attach_worker(&pool, 1);

                a.set("S1", "user", "alice");
                assert!(settle_until(|| b.contains("S1")).await);
                assert_eq!(b.get("S1", "user"), Some(json!("alice")));

                b.set("S1", "theme", "dark");
                let has_theme = || a.record("S1").is_some_and(|r| r.data.contains_key("theme"));
                assert!(settle_until(has_theme).await);
                assert_eq!(a.get("S1", "user"), Some(json!("alice")));

                // far past any expiry horizon
                let expired = b.sweep_at(i64::MAX);
                assert_eq!(expired, vec!["S1".to_string()]);
                assert!(settle_until(|| !a.contains("S1") && !b.contains("S1")).await);
            })
            .await;
    }
}
