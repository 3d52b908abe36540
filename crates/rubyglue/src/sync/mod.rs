//! Synchronization primitives for runtimes that lack their own
//!
//! An embedded interpreter normally exposes its own "run this under my lock"
//! primitive. [`GlobalLock`] is the explicit replacement for runtimes that do
//! not: a single process-wide execution lock with acquire/execute/release
//! operations and owner tracking, so [`Runtime::thread_has_lock`](crate::Runtime::thread_has_lock)
//! can be answered exactly.

mod lock;

pub use lock::{GlobalLock, GlobalLockGuard};
