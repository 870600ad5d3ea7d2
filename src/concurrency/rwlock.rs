//! Writer-preferring fair read/write lock, ported from
//! `examples/original_source/threading_lib/read_write_lock.py`'s
//! `FairReadWriteLock`: a condition variable guarding `(readers, writer,
//! writers_waiting)`, where a pending writer blocks new readers so writers
//! never starve under a steady stream of reads.
//!
//! Guards hold only a cloned `Arc<Inner>`, not a `parking_lot` guard, so
//! they can be held across `.await` points — the lock's own book-keeping
//! acquisitions are brief, synchronous, and never span an await.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct State {
    writers_waiting: usize,
    readers: usize,
    writer: bool,
}

struct Inner {
    state: Mutex<State>,
    changed: Condvar,
}

#[derive(Clone)]
pub struct FairRwLock {
    inner: Arc<Inner>,
}

impl FairRwLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State { writers_waiting: 0, readers: 0, writer: false }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Block until no writer holds or is waiting for the lock, then take a
    /// read permit.
    pub fn read(&self) -> ReadGuard {
        let mut state = self.inner.state.lock();
        while state.writer || state.writers_waiting > 0 {
            self.inner.changed.wait(&mut state);
        }
        state.readers += 1;
        drop(state);
        ReadGuard { inner: self.inner.clone() }
    }

    /// Register as a waiting writer immediately (preventing new readers
    /// from starting), then block until the lock is free.
    pub fn write(&self) -> WriteGuard {
        let mut state = self.inner.state.lock();
        state.writers_waiting += 1;
        while state.writer || state.readers > 0 {
            self.inner.changed.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer = true;
        drop(state);
        WriteGuard { inner: self.inner.clone() }
    }
}

impl Default for FairRwLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReadGuard {
    inner: Arc<Inner>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.inner.changed.notify_all();
        }
    }
}

pub struct WriteGuard {
    inner: Arc<Inner>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.writer = false;
        self.inner.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn concurrent_reads_proceed_together() {
        let lock = FairRwLock::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let lock = lock.clone();
                let active = active.clone();
                let peak = peak.clone();
                scope.spawn(move || {
                    let _g = lock.read();
                    let n = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(n, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) > 1, "readers should overlap");
    }

    #[test]
    fn writer_excludes_readers_and_other_writers() {
        let lock = FairRwLock::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let lock = lock.clone();
                let active = active.clone();
                let peak = peak.clone();
                scope.spawn(move || {
                    let _g = lock.write();
                    let n = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(n, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1, "writers must be exclusive");
    }

    #[test]
    fn pending_writer_blocks_new_readers() {
        let lock = FairRwLock::new();
        let r1 = lock.read();
        let lock2 = lock.clone();
        let writer_has_lock = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = writer_has_lock.clone();

        let handle = std::thread::spawn(move || {
            let _w = lock2.write();
            flag.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(20));
        // A second reader must not jump ahead of the waiting writer.
        assert!(!writer_has_lock.load(Ordering::SeqCst));
        drop(r1);
        handle.join().unwrap();
        assert!(writer_has_lock.load(Ordering::SeqCst));
    }
}
