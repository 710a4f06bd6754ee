//! File-descriptor pool
//!
//! Every worker opens files while holding a permit from this pool, bounding
//! the number of simultaneously open descriptors across the whole process.
//! Acquisition blocks when the pool is exhausted; permits are released on
//! every exit path through the guard's `Drop`.

use std::sync::{Condvar, Mutex};

/// Maximum concurrent open files across all workers
pub const MAX_OPEN_FILES: usize = 20;

/// Counting semaphore bounding concurrent file opens.
#[derive(Debug)]
pub struct HandlePool {
    available: Mutex<usize>,
    released: Condvar,
    max: usize,
}

impl HandlePool {
    pub fn new(max: usize) -> Self {
        Self {
            available: Mutex::new(max),
            released: Condvar::new(),
            max,
        }
    }

    /// Block until a permit is available and return its guard.
    pub fn acquire(&self) -> HandleGuard<'_> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *available -= 1;
        HandleGuard { pool: self }
    }

    fn release(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *available += 1;
        self.released.notify_one();
    }

    /// Permits currently available (primarily for shutdown assertions).
    pub fn available(&self) -> usize {
        *self
            .available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl Default for HandlePool {
    fn default() -> Self {
        Self::new(MAX_OPEN_FILES)
    }
}

/// Scoped permit; releasing happens in `Drop` so early returns and error
/// paths cannot leak a descriptor slot.
#[derive(Debug)]
pub struct HandleGuard<'a> {
    pool: &'a HandlePool,
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_release_restores_count() {
        let pool = HandlePool::new(3);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_blocking_acquire_under_contention() {
        let pool = Arc::new(HandlePool::new(2));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let _guard = pool.acquire();
                    // Count never goes negative while the guard is held
                    assert!(pool.available() <= 2);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.available(), 2);
    }
}
