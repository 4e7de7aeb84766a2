//! Engine-wide execution lock.
//!
//! One mutex serializes every configuration-or-dispatch sequence per engine
//! instance. The `locked` flag is a non-authoritative observability field for
//! external polling (the mutex alone is the source of truth).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub struct ExecutionLock {
    mutex: Mutex<()>,
    locked: AtomicBool,
}

/// RAII guard; releases the lock and clears the flag on drop.
pub struct ExecutionGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    locked: &'a AtomicBool,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the engine-wide lock is held.
    pub fn acquire(&self) -> ExecutionGuard<'_> {
        // A poisoned lock only means another caller panicked mid-sequence;
        // the engine state it guards is still structurally valid.
        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.locked.store(true, Ordering::SeqCst);
        ExecutionGuard {
            _guard: guard,
            locked: &self.locked,
        }
    }

    /// Whether some caller currently holds the lock. Polling aid only.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn flag_tracks_guard_lifetime() {
        let lock = ExecutionLock::new();
        assert!(!lock.is_locked());
        {
            let _guard = lock.acquire();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn at_most_one_sequence_runs_at_a_time() {
        let lock = Arc::new(ExecutionLock::new());
        let counter = Arc::new(Mutex::new(0u32));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _guard = lock.acquire();
                    let mut c = counter.lock().unwrap();
                    *c += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 800);
        assert!(!lock.is_locked());
    }
}
