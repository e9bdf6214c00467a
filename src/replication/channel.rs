//! Worker side of the replication channel
//!
//! Delivery is at-most-once with no acknowledgement: a message is dropped
//! when the bounded queue is full or the channel is gone, and the local
//! store is already up to date before anything is sent.

use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::ReplicationMessage;
use crate::session::SessionStore;

pub type ReplicationReceiver = mpsc::Receiver<ReplicationMessage>;

/// Sending half handed to the session store
#[derive(Debug, Clone)]
pub struct ReplicationSender {
    tx: Option<mpsc::Sender<ReplicationMessage>>,
}

impl ReplicationSender {
    /// Sender with no channel behind it; every broadcast is dropped
    pub const fn detached() -> Self {
        Self { tx: None }
    }

    /// Queue a message for siblings; returns whether it was queued
    pub fn broadcast(&self, message: ReplicationMessage) -> bool {
        let Some(tx) = &self.tx else {
            tracing::trace!("no replication channel, message dropped");
            return false;
        };
        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("replication queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("replication channel closed, message dropped");
                false
            }
        }
    }
}

/// Bounded queue between the store and whatever carries messages out
pub fn channel(capacity: usize) -> (ReplicationSender, ReplicationReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ReplicationSender { tx: Some(tx) }, rx)
}

/// Write queued messages to the parent, one JSON line each
///
/// Returns when the queue closes or the pipe breaks; later broadcasts are
/// then dropped by [`ReplicationSender::broadcast`].
pub async fn forward_outbound<W>(mut outbound: ReplicationReceiver, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let mut line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to encode replication message: {e}");
                continue;
            }
        };
        line.push('\n');

        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!("replication channel to parent lost: {e}");
            return;
        }
    }
}

/// Apply messages arriving from the parent until it hangs up
pub async fn apply_inbound<R>(reader: R, store: Rc<SessionStore>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(message) = ReplicationMessage::decode(&line) {
                    store.apply(message);
                }
            }
            Ok(None) => {
                tracing::info!("replication channel from parent closed");
                return;
            }
            Err(e) => {
                tracing::warn!("replication channel read failed: {e}");
                return;
            }
        }
    }
}

/// Standalone transport: expiry announcements come straight back
///
/// A sync carries state the local map already holds, possibly older than
/// it when a later sync was dropped, so it is discarded here.
pub async fn loopback(mut outbound: ReplicationReceiver, store: Rc<SessionStore>) {
    while let Some(message) = outbound.recv().await {
        match message {
            ReplicationMessage::Expire { .. } => store.apply(message),
            ReplicationMessage::Sync { .. } => {}
        }
    }
}
