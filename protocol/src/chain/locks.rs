//! Per-chain writer serialization.
//!
//! Appending is a read-then-write sequence: count the chain, derive the ROM,
//! encode, publish. Two writers interleaving on the same chain would both
//! compute the same index. The lock table gives every chain id its own
//! mutex so writers on one chain queue up while writers on different chains
//! proceed in parallel. Readers never take these locks.
//!
//! This table only orders threads of one engine. Writers in other processes
//! are excluded by the store's own chain lock, taken inside this one.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Lazily populated table of one mutex per chain id.
#[derive(Debug, Default)]
pub struct ChainLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the writer lock of `chain_id`.
    pub fn with_lock<T>(&self, chain_id: &str, f: impl FnOnce() -> T) -> T {
        // Clone the Arc out first so the DashMap shard is not held while we
        // wait on the chain mutex.
        let lock = self
            .locks
            .entry(chain_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock();
        f()
    }

    /// Number of chains that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_chain_is_exclusive() {
        let locks = Arc::new(ChainLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock("trunk", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn different_chains_get_different_locks() {
        let locks = ChainLocks::new();
        // Nested locking of two different chains must not deadlock.
        let value = locks.with_lock("a", || locks.with_lock("b", || 7));
        assert_eq!(value, 7);
        assert_eq!(locks.len(), 2);
    }
}
