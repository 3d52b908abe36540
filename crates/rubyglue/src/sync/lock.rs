//! Owner-tracking execution lock

use crossbeam::atomic::AtomicCell;
use parking_lot::lock_api::RawMutex as RawMutexApi;
use parking_lot::RawMutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

/// Reentrant, owner-tracking execution lock
///
/// Exactly one native thread owns the lock at a time. The owner may acquire
/// it again without blocking; every other thread blocks until the owner has
/// released all of its acquisitions. There is no timeout and no cancellation.
pub struct GlobalLock {
    /// Underlying OS-level mutex (held for the whole ownership period)
    raw: RawMutex,

    /// Current owner thread (None if unlocked)
    owner: AtomicCell<Option<ThreadId>>,

    /// Nested acquisitions by the owner
    depth: AtomicUsize,

    /// Number of times ownership was taken by a thread (not nested re-entries)
    acquisitions: AtomicU64,
}

impl GlobalLock {
    /// Create a new, unowned lock
    pub fn new() -> Self {
        Self {
            raw: RawMutex::INIT,
            owner: AtomicCell::new(None),
            depth: AtomicUsize::new(0),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Acquire the lock for the calling thread, blocking if another thread
    /// owns it. Released when the returned guard is dropped.
    pub fn acquire(&self) -> GlobalLockGuard<'_> {
        let me = thread::current().id();
        if self.owner.load() == Some(me) {
            // Only the owner ever touches depth while the lock is held
            self.depth.fetch_add(1, Ordering::Relaxed);
        } else {
            if !self.raw.try_lock() {
                tracing::trace!(thread = ?me, "waiting for global execution lock");
                self.raw.lock();
            }
            self.owner.store(Some(me));
            self.depth.store(1, Ordering::Relaxed);
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
        }
        GlobalLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Run `f` while owning the lock
    pub fn execute<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.acquire();
        f()
    }

    /// Check if the calling thread owns the lock
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.owner.load() == Some(thread::current().id())
    }

    /// Check if any thread owns the lock
    pub fn is_locked(&self) -> bool {
        self.owner.load().is_some()
    }

    /// Check current owner
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.load()
    }

    /// Number of times a thread took ownership
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn release(&self) {
        if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(None);
            // SAFETY: depth reached zero on the owning thread, which locked `raw`
            unsafe { self.raw.unlock() };
        }
    }
}

impl Default for GlobalLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for [`GlobalLock`] (releases one acquisition on drop)
///
/// Not `Send`: the acquisition belongs to the thread that made it.
pub struct GlobalLockGuard<'a> {
    lock: &'a GlobalLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for GlobalLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
