//! Per-`(user, target)` in-flight registry.
//!
//! # Invariants
//! - At most one guard exists per `VoteKey` at a time.
//! - Waiting is bounded by the caller-supplied timeout; there is no
//!   unbounded block.
//! - Dropping a guard releases the key and wakes waiters.

use crate::model::vote::VoteKey;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Registry of vote keys with an operation in progress.
#[derive(Debug, Default)]
pub struct InFlightVotes {
    active: Mutex<HashSet<VoteKey>>,
    released: Condvar,
}

/// Exclusive claim on one vote key. Released on drop.
#[derive(Debug)]
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct InFlightGuard<'a> {
    registry: &'a InFlightVotes,
    key: VoteKey,
}

impl InFlightGuard<'_> {
    pub fn key(&self) -> VoteKey {
        self.key
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock_active().remove(&self.key);
        self.registry.released.notify_all();
    }
}

impl InFlightVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, waiting at most `wait` for a current holder to finish.
    ///
    /// Returns `None` when the key is still held after the wait.
    pub fn try_acquire(&self, key: VoteKey, wait: Duration) -> Option<InFlightGuard<'_>> {
        let deadline = Instant::now() + wait;
        let mut active = self.lock_active();

        while active.contains(&key) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (next, _) = self
                .released
                .wait_timeout(active, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            active = next;
        }

        active.insert(key);
        Some(InFlightGuard {
            registry: self,
            key,
        })
    }

    pub fn is_active(&self, key: &VoteKey) -> bool {
        self.lock_active().contains(key)
    }

    fn lock_active(&self) -> MutexGuard<'_, HashSet<VoteKey>> {
        // The set stays valid even if a holder panicked mid-operation.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::InFlightVotes;
    use crate::model::vote::{TargetRef, VoteKey};
    use std::thread;
    use std::time::Duration;
    use uuid::Uuid;

    fn key() -> VoteKey {
        VoteKey::new(Uuid::new_v4(), TargetRef::article(Uuid::new_v4()))
    }

    #[test]
    fn second_claim_on_same_key_fails_fast() {
        let registry = InFlightVotes::new();
        let key = key();

        let guard = registry.try_acquire(key, Duration::ZERO).unwrap();
        assert!(registry.try_acquire(key, Duration::ZERO).is_none());
        assert!(registry.is_active(&key));

        drop(guard);
        assert!(!registry.is_active(&key));
        assert!(registry.try_acquire(key, Duration::ZERO).is_some());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let registry = InFlightVotes::new();
        let _first = registry.try_acquire(key(), Duration::ZERO).unwrap();
        let _second = registry.try_acquire(key(), Duration::ZERO).unwrap();
    }

    #[test]
    fn waiter_gets_key_after_holder_releases() {
        let registry = InFlightVotes::new();
        let key = key();
        let guard = registry.try_acquire(key, Duration::ZERO).unwrap();

        thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                registry
                    .try_acquire(key, Duration::from_secs(5))
                    .map(|guard| guard.key())
            });
            thread::sleep(Duration::from_millis(20));
            drop(guard);
            assert_eq!(waiter.join().unwrap(), Some(key));
        });
    }
}
