//! Session replication between sibling worker processes
//!
//! Each worker owns one line-oriented channel to its parent. The parent
//! fans every message out to all workers, the sender included.

mod channel;
mod message;

pub use channel::{
    apply_inbound, channel, forward_outbound, loopback, ReplicationReceiver, ReplicationSender,
};
pub use message::ReplicationMessage;
