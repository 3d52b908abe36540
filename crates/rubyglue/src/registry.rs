//! Object Registry
//!
//! The garbage-collection root that pins VM objects referenced by host-side
//! wrappers. The registry owns one VM array, created on first use and
//! registered as a GC root; every live [`ObjectHandle`](crate::ObjectHandle)
//! has its value in that array exactly once.
//!
//! There is no internal lock around the VM array: every mutation happens on
//! the thread that owns the runtime's execution lock.

use crate::error::{BridgeError, BridgeResult};
use crate::gvl::run_with_lock;
use crate::runtime::Runtime;
use crate::value::Value;
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// GC root for host-referenced VM objects
pub struct ObjectRegistry {
    /// The rooted VM array (None until first use, and after teardown)
    root: AtomicCell<Option<Value>>,

    /// Set once by teardown; registration is refused afterwards
    torn_down: AtomicBool,
}

impl ObjectRegistry {
    /// Create an empty registry (no VM array allocated yet)
    pub fn new() -> Self {
        Self {
            root: AtomicCell::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    /// The rooted array, allocating and rooting it on first use
    fn root(&self, rt: &dyn Runtime) -> Value {
        if let Some(root) = self.root.load() {
            return root;
        }
        let root = rt.array_new();
        rt.gc_register(root);
        self.root.store(Some(root));
        tracing::debug!(?root, "object registry root created");
        root
    }

    /// Pin `value`. The caller must own the execution lock and must register
    /// each logical object once.
    pub fn register(&self, rt: &dyn Runtime, value: Value) -> BridgeResult<()> {
        debug_assert!(rt.thread_has_lock(), "registry mutated without the VM lock");
        if self.is_torn_down() {
            return Err(BridgeError::RegistryTornDown);
        }
        let root = self.root(rt);
        rt.array_push(root, value);
        tracing::debug!(?value, size = rt.array_len(root), "object registered");
        Ok(())
    }

    /// Unpin the first occurrence of `value`; a value that is not present is
    /// ignored. The caller must own the execution lock.
    pub fn unregister(&self, rt: &dyn Runtime, value: Value) {
        debug_assert!(rt.thread_has_lock(), "registry mutated without the VM lock");
        let Some(root) = self.root.load() else {
            return;
        };
        let position = (0..rt.array_len(root)).find(|&index| rt.array_entry(root, index) == value);
        if let Some(index) = position {
            rt.array_delete_at(root, index);
            tracing::debug!(?value, size = rt.array_len(root), "object unregistered");
        }
    }

    /// Number of pinned entries
    pub fn len(&self, rt: &dyn Runtime) -> usize {
        match self.root.load() {
            Some(root) => run_with_lock(rt, || rt.array_len(root)),
            None => 0,
        }
    }

    /// Check if nothing is pinned
    pub fn is_empty(&self, rt: &dyn Runtime) -> bool {
        self.len(rt) == 0
    }

    /// Check if `value` is pinned
    pub fn contains(&self, rt: &dyn Runtime, value: Value) -> bool {
        match self.root.load() {
            Some(root) => run_with_lock(rt, || {
                (0..rt.array_len(root)).any(|index| rt.array_entry(root, index) == value)
            }),
            None => false,
        }
    }

    /// Destroy the registry root. Called once, at VM shutdown; every value it
    /// pinned becomes collectable.
    pub fn teardown(&self, rt: &dyn Runtime) {
        self.torn_down.store(true, Ordering::SeqCst);
        if let Some(root) = self.root.swap(None) {
            run_with_lock(rt, || rt.gc_unregister(root));
            tracing::debug!(?root, "object registry torn down");
        }
    }

    /// Check if teardown has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
