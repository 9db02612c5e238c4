//! Per-vote mutation locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes mutations of the same vote inside this process.
///
/// Votes never block each other. Across processes the status guard and
/// the ledger's unique indexes still hold; this only keeps local writers
/// from racing into them.
#[derive(Clone, Default)]
pub struct VoteLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl VoteLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `vote_id`.
    pub async fn acquire(&self, vote_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only referenced by the table are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(vote_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of votes with a held or awaited lock.
    pub async fn active(&self) -> usize {
        let locks = self.locks.lock().await;
        locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_vote_is_exclusive() {
        let locks = VoteLocks::new();
        let guard = locks.acquire("vote1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("vote1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .expect("task panicked");
    }

    #[tokio::test]
    async fn test_different_votes_do_not_block() {
        let locks = VoteLocks::new();
        let _first = locks.acquire("vote1").await;

        let second = tokio::time::timeout(Duration::from_secs(1), locks.acquire("vote2")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = VoteLocks::new();
        drop(locks.acquire("vote1").await);
        drop(locks.acquire("vote2").await);

        assert_eq!(locks.active().await, 0);
        let _held = locks.acquire("vote3").await;
        assert_eq!(locks.active().await, 1);
        assert_eq!(locks.locks.lock().await.len(), 1);
    }
}
