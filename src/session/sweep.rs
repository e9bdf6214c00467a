//! Periodic TTL sweep

use std::rc::Rc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::SessionStore;

/// Scan the store every `every` and announce expired sessions
///
/// Runs until the surrounding `LocalSet` is dropped.
pub async fn run_sweeper(store: Rc<SessionStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let expired = store.sweep();
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "sweep announced expired sessions");
        }
    }
}
