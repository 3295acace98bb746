use crate::infrastructure::{ApiError, InboxRepository};
use crate::model::Conversation;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadState {
    pub active: bool,
    pub total: u64,
}

/// Session-scoped count of unread messages across every conversation.
///
/// Clones share the same counter. Mutations are applied under the watch
/// channel's lock, so concurrent increments and decrements commute. While no
/// session is active, mutations are ignored and the total reads as zero.
#[derive(Debug, Clone)]
pub struct UnreadLedger {
    state: Arc<watch::Sender<UnreadState>>,
}

impl Default for UnreadLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UnreadLedger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(UnreadState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn start_session(&self, total: u64) {
        info!("Unread session started with {} unread", total);
        self.state.send_replace(UnreadState {
            active: true,
            total,
        });
    }

    /// End the session (logout).
    pub fn clear(&self) {
        self.state.send_replace(UnreadState::default());
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    pub fn total(&self) -> u64 {
        self.state.borrow().total
    }

    /// Returns the new total.
    pub fn increment(&self, n: u64) -> u64 {
        self.update(|total| total.saturating_add(n))
    }

    /// Returns the new total, floored at zero.
    pub fn decrement(&self, n: u64) -> u64 {
        self.update(|total| total.saturating_sub(n))
    }

    /// Set the total from an already fetched conversation list. Starts the
    /// session if none is active.
    pub fn reconcile(&self, conversations: &[Conversation]) -> u64 {
        let total: u64 = conversations.iter().map(|c| c.unread_count as u64).sum();
        let previous = self.state.send_replace(UnreadState {
            active: true,
            total,
        });
        if previous.total != total {
            debug!("Unread ledger reconciled: {} -> {}", previous.total, total);
        }
        total
    }

    /// Refetch every conversation and reset the total to their unread sum.
    pub async fn refresh(&self, repository: &dyn InboxRepository) -> Result<u64, ApiError> {
        let conversations = repository.list_conversations().await?;
        Ok(self.reconcile(&conversations))
    }

    pub fn subscribe(&self) -> watch::Receiver<UnreadState> {
        self.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(u64) -> u64) -> u64 {
        let mut result = 0;
        self.state.send_if_modified(|state| {
            if !state.active {
                return false;
            }
            let next = f(state.total);
            result = next;
            let changed = next != state.total;
            state.total = next;
            changed
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::api::repository::mock::MockRepository;
    use crate::sync::testing::conversation;
    use std::sync::atomic::Ordering;

    #[test]
    fn inactive_ledger_ignores_mutations() {
        let ledger = UnreadLedger::new();
        assert_eq!(ledger.increment(3), 0);
        assert!(!ledger.is_active());

        ledger.start_session(2);
        assert_eq!(ledger.increment(1), 3);

        ledger.clear();
        assert_eq!(ledger.total(), 0);
        assert_eq!(ledger.increment(1), 0);
    }

    #[test]
    fn decrement_floors_at_zero() {
        let ledger = UnreadLedger::new();
        ledger.start_session(4);
        assert_eq!(ledger.decrement(6), 0);
        assert_eq!(ledger.decrement(1), 0);
    }

    #[test]
    fn clones_share_the_counter() {
        let ledger = UnreadLedger::new();
        let other = ledger.clone();
        ledger.start_session(1);
        other.increment(2);
        assert_eq!(ledger.total(), 3);
    }

    #[tokio::test]
    async fn refresh_sums_unread_counts() {
        let repo = MockRepository::with_conversations(vec![
            conversation("a", 3, None),
            conversation("b", 0, None),
            conversation("c", 4, None),
        ]);
        let ledger = UnreadLedger::new();

        assert_eq!(ledger.refresh(&repo).await.unwrap(), 7);
        assert!(ledger.is_active());

        repo.fail_list.store(true, Ordering::SeqCst);
        assert!(ledger.refresh(&repo).await.is_err());
        assert_eq!(ledger.total(), 7);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let ledger = UnreadLedger::new();
        ledger.start_session(1);
        let mut rx = ledger.subscribe();
        assert_eq!(rx.borrow().total, 1);

        ledger.increment(1);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().total, 2);

        ledger.clear();
        rx.changed().await.unwrap();
        assert!(!rx.borrow().active);
    }
}
