//! Object Handle
//!
//! A host-owned wrapper around one VM object. Construction instantiates the
//! class and pins the result in the [`ObjectRegistry`](crate::ObjectRegistry)
//! within the same lock-held section; dropping the handle unpins it. A failed
//! construction pins nothing.

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::invoke;
use crate::protect::trap;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Pinned handle to a VM object
///
/// `Send + Sync`: handles may move between threads; every VM interaction
/// acquires the execution lock transparently.
pub struct ObjectHandle {
    bridge: Arc<Bridge>,
    value: Value,
    class_name: String,
}

impl ObjectHandle {
    /// Instantiate `class_path` with constructor arguments `args`.
    ///
    /// Fails with [`BridgeError::Construction`] when the class path does not
    /// resolve or its constructor raises.
    pub fn new(bridge: &Arc<Bridge>, class_path: &str, args: &[Value]) -> BridgeResult<Self> {
        bridge.run_live(|rt| {
            let value = trap(rt, None, |rt| {
                let class = rt.path_to_class(class_path);
                rt.class_new_instance(class, args)
            })
            .map_err(|record| BridgeError::Construction {
                class_path: class_path.to_string(),
                record,
            })?;

            bridge.registry().register(rt, value)?;

            Ok(Self {
                bridge: bridge.clone(),
                value,
                class_name: class_path.to_string(),
            })
        })
    }

    /// Class path the object was constructed from
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The pinned VM value
    pub fn value(&self) -> Value {
        self.value
    }

    /// Bridge this handle belongs to
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Call `method` with exactly `args`.
    ///
    /// Fails with [`BridgeError::Invocation`] when the method is missing or
    /// raises.
    pub fn call(&self, method: &str, args: &[Value]) -> BridgeResult<Value> {
        self.bridge
            .run_live(|rt| invoke::call(rt, self.value, method, args))
            .map_err(|err| match err {
                BridgeError::Invocation { record, .. } => BridgeError::Invocation {
                    target: format!("{}#{}", self.class_name, method),
                    record,
                },
                other => other,
            })
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        // After shutdown the registry is gone and the VM must not be touched
        let _ = self.bridge.run_live(|rt| {
            self.bridge.registry().unregister(rt, self.value);
            Ok(())
        });
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("class_name", &self.class_name)
            .field("value", &self.value)
            .finish()
    }
}
