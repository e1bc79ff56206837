//! Post-commit client notification.
//!
//! After a transaction scope commits a write, the [`Database`](crate::Database)
//! pings its [`CommitNotifier`] once. Scopes that roll back, or that never
//! wrote, produce no notification. Notifier failures are logged and never
//! affect the already-committed transaction.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::trace;

use crate::error::DbError;

/// Sink pinged after each committed write transaction.
pub trait CommitNotifier: Send + Sync + fmt::Debug + 'static {
    /// Tell connected clients that committed data changed.
    ///
    /// # Errors
    /// Implementations report delivery failures; the caller only logs them.
    fn notify_all_clients(&self) -> Result<(), DbError>;
}

/// Notifier that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl CommitNotifier for NoopNotifier {
    fn notify_all_clients(&self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Emitted once per committed write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitEvent {
    /// Starts at 1 and increases by one per commit.
    pub sequence: u64,
}

/// Fans commit events out to any number of subscribers over a tokio broadcast channel.
///
/// Having no subscribers is not an error. Slow subscribers may observe
/// `RecvError::Lagged` once `capacity` events are pending.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<CommitEvent>,
    sequence: AtomicU64,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CommitEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for BroadcastNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastNotifier")
            .field("subscribers", &self.sender.receiver_count())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

impl CommitNotifier for BroadcastNotifier {
    fn notify_all_clients(&self) -> Result<(), DbError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        match self.sender.send(CommitEvent { sequence }) {
            Ok(receivers) => trace!(sequence, receivers, "commit event published"),
            Err(_) => trace!(sequence, "commit event dropped: no subscribers"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_sequenced_events() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        notifier.notify_all_clients().expect("notify");
        notifier.notify_all_clients().expect("notify");
        assert_eq!(rx.recv().await.expect("event").sequence, 1);
        assert_eq!(rx.recv().await.expect("event").sequence, 2);
    }

    #[test]
    fn no_subscribers_is_fine() {
        assert!(BroadcastNotifier::default().notify_all_clients().is_ok());
    }
}
