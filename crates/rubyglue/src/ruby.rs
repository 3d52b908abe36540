//! Binding to the C Ruby interpreter
//!
//! [`RubyRuntime`] implements [`Runtime`] over libruby through `rb-sys`.
//! Built with the `ruby` feature; linking needs a Ruby installation with its
//! development headers.
//!
//! Threading follows the interpreter's rules:
//! - [`RubyRuntime::boot`] must run on the thread that will own the VM, which
//!   then holds the GVL.
//! - Other threads may enter only if Ruby created them and they released the
//!   GVL (`rb_thread_call_without_gvl`); `call_with_lock` reacquires it with
//!   `rb_thread_call_with_gvl`. Any other native thread aborts the process.
//!
//! Ruby raises with `longjmp`. A raise inside [`Runtime::protect`] skips the
//! Rust frames between `rb_protect` and the raise point without running their
//! destructors, so protected bodies must not hold values with drop glue
//! across a call that may raise.

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::{ProtectState, Runtime};
use crate::value::{Id, Value};
use parking_lot::Mutex;
use rb_sys::{ruby_value_type, Qfalse, Qnil, Qtrue, ID, VALUE};
use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::os::raw::{c_char, c_int, c_long};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

// Argument slices are handed to libruby as `VALUE` arrays without copying
const _: () = assert!(mem::size_of::<VALUE>() == mem::size_of::<Value>());
const _: () = assert!(mem::size_of::<ID>() == mem::size_of::<Id>());

extern "C" {
    // Exported by libruby but missing from its public headers
    fn ruby_thread_has_gvl_p() -> c_int;
}

#[inline(always)]
fn raw(value: Value) -> VALUE {
    value.to_bits() as VALUE
}

#[inline(always)]
fn wrap(value: VALUE) -> Value {
    Value::from_bits(value as u64)
}

/// One `rb_gc_register_address` slot, shared by every registration of the
/// same value
struct Pinned {
    slot: Box<VALUE>,
    count: usize,
}

/// [`Runtime`] over the process's C Ruby VM
pub struct RubyRuntime {
    roots: Mutex<HashMap<VALUE, Pinned>>,
}

impl RubyRuntime {
    /// Initialize the interpreter on the calling thread.
    ///
    /// Ruby can be set up once per process and not again after
    /// [`Runtime::cleanup`]; booting twice returns a runtime over the VM that
    /// is already running.
    pub fn boot() -> BridgeResult<Self> {
        let state = unsafe {
            let mut stack_start: VALUE = 0;
            rb_sys::ruby_init_stack(&mut stack_start as *mut VALUE as *mut _);
            rb_sys::ruby_setup()
        };
        if state != 0 {
            return Err(BridgeError::Boot(ProtectState::from_tag(state)));
        }

        let runtime = Self {
            roots: Mutex::new(HashMap::new()),
        };
        unsafe {
            rb_sys::ruby_init_loadpath();
            // Without the encoding database every non-ASCII encoding is an
            // uninitialized constant
            rb_sys::rb_enc_find_index(b"encdb\0".as_ptr() as *const c_char);
        }
        let rubygems = runtime.str_new("rubygems");
        let require = runtime.intern("require");
        if let Err(state) = runtime.protect(&mut || runtime.funcall(runtime.nil(), require, &[rubygems])) {
            tracing::warn!(?state, "rubygems unavailable");
            runtime.clear_exception();
        }
        tracing::info!("ruby VM booted");
        Ok(runtime)
    }
}

impl fmt::Debug for RubyRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RubyRuntime")
            .field("pinned", &self.roots.lock().len())
            .finish()
    }
}

// ============================================================================
// Trampolines
// ============================================================================

/// Closure run by `rb_thread_call_with_gvl`; a host panic is carried back
/// across the C frames and resumed on the Rust side
struct LockedCall<'a> {
    f: &'a mut dyn FnMut(),
    panic: Option<Box<dyn Any + Send>>,
}

unsafe extern "C" fn locked_call(data: *mut c_void) -> *mut c_void {
    let call = &mut *(data as *mut LockedCall<'_>);
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (call.f)())) {
        call.panic = Some(payload);
    }
    ptr::null_mut()
}

/// Closure run by `rb_protect`
struct ProtectedCall<'a> {
    f: &'a mut dyn FnMut() -> Value,
    panic: Option<Box<dyn Any + Send>>,
}

unsafe extern "C" fn protected_call(data: VALUE) -> VALUE {
    let call = &mut *(data as *mut ProtectedCall<'_>);
    match panic::catch_unwind(AssertUnwindSafe(|| (call.f)())) {
        Ok(value) => raw(value),
        Err(payload) => {
            call.panic = Some(payload);
            Qnil as VALUE
        }
    }
}

// ============================================================================
// Embedding API
// ============================================================================

impl Runtime for RubyRuntime {
    fn thread_has_lock(&self) -> bool {
        unsafe { ruby_thread_has_gvl_p() != 0 }
    }

    fn call_with_lock(&self, f: &mut dyn FnMut()) {
        let mut call = LockedCall { f, panic: None };
        unsafe {
            rb_sys::rb_thread_call_with_gvl(
                Some(locked_call),
                &mut call as *mut LockedCall<'_> as *mut c_void,
            );
        }
        if let Some(payload) = call.panic {
            panic::resume_unwind(payload);
        }
    }

    fn protect(&self, f: &mut dyn FnMut() -> Value) -> Result<Value, ProtectState> {
        let mut call = ProtectedCall { f, panic: None };
        let mut state: c_int = 0;
        let result = unsafe {
            rb_sys::rb_protect(
                Some(protected_call),
                &mut call as *mut ProtectedCall<'_> as VALUE,
                &mut state,
            )
        };
        if let Some(payload) = call.panic.take() {
            panic::resume_unwind(payload);
        }
        match state {
            0 => Ok(wrap(result)),
            tag => Err(ProtectState::from_tag(tag)),
        }
    }

    fn load_protect(&self, path: &str, anonymous: bool) -> Result<(), ProtectState> {
        let fname = self.str_new(path);
        let mut state: c_int = 0;
        unsafe { rb_sys::rb_load_protect(raw(fname), c_int::from(anonymous), &mut state) };
        match state {
            0 => Ok(()),
            tag => Err(ProtectState::from_tag(tag)),
        }
    }

    fn current_exception(&self) -> Value {
        wrap(unsafe { rb_sys::rb_errinfo() })
    }

    fn clear_exception(&self) {
        unsafe { rb_sys::rb_set_errinfo(Qnil as VALUE) }
    }

    #[allow(unreachable_code)]
    fn raise(&self, class: Value, message: &str) -> ! {
        let message = self.str_new(message);
        unsafe {
            let exception = rb_sys::rb_exc_new_str(raw(class), raw(message));
            rb_sys::rb_exc_raise(exception);
        }
        unreachable!("rb_exc_raise returned")
    }

    fn nil(&self) -> Value {
        wrap(Qnil as VALUE)
    }

    fn truthy(&self, value: Value) -> bool {
        let value = raw(value);
        value != Qnil as VALUE && value != Qfalse as VALUE
    }

    fn intern(&self, name: &str) -> Id {
        let id = unsafe { rb_sys::rb_intern2(name.as_ptr() as *const c_char, name.len() as c_long) };
        Id::from_bits(id as u64)
    }

    fn str_new(&self, s: &str) -> Value {
        wrap(unsafe { rb_sys::rb_utf8_str_new(s.as_ptr() as *const c_char, s.len() as c_long) })
    }

    fn int_new(&self, n: i64) -> Value {
        wrap(unsafe { rb_sys::rb_ll2inum(n) })
    }

    fn string_value(&self, value: Value) -> Option<String> {
        let value = raw(value);
        unsafe {
            if !rb_sys::RB_TYPE_P(value, ruby_value_type::RUBY_T_STRING) {
                return None;
            }
            let bytes = std::slice::from_raw_parts(
                rb_sys::RSTRING_PTR(value) as *const u8,
                rb_sys::RSTRING_LEN(value) as usize,
            );
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    fn int_value(&self, value: Value) -> Option<i64> {
        let is_integer = unsafe { rb_sys::rb_obj_is_kind_of(raw(value), rb_sys::rb_cInteger) };
        if is_integer != Qtrue as VALUE {
            return None;
        }
        // Bignums outside the i64 range raise RangeError
        let mut out = None;
        let converted = self.protect(&mut || {
            out = Some(unsafe { rb_sys::rb_num2ll(raw(value)) });
            self.nil()
        });
        if converted.is_err() {
            self.clear_exception();
        }
        out
    }

    fn array_new(&self) -> Value {
        wrap(unsafe { rb_sys::rb_ary_new() })
    }

    fn array_push(&self, array: Value, value: Value) {
        unsafe { rb_sys::rb_ary_push(raw(array), raw(value)) };
    }

    fn array_len(&self, array: Value) -> usize {
        let array = raw(array);
        unsafe {
            if rb_sys::RB_TYPE_P(array, ruby_value_type::RUBY_T_ARRAY) {
                rb_sys::RARRAY_LEN(array) as usize
            } else {
                0
            }
        }
    }

    fn array_entry(&self, array: Value, index: usize) -> Value {
        wrap(unsafe { rb_sys::rb_ary_entry(raw(array), index as c_long) })
    }

    fn array_delete_at(&self, array: Value, index: usize) -> Value {
        wrap(unsafe { rb_sys::rb_ary_delete_at(raw(array), index as c_long) })
    }

    fn class_of(&self, value: Value) -> Value {
        wrap(unsafe { rb_sys::rb_obj_class(raw(value)) })
    }

    fn class_path(&self, class: Value) -> Value {
        wrap(unsafe { rb_sys::rb_class_path(raw(class)) })
    }

    fn obj_as_string(&self, value: Value) -> Value {
        wrap(unsafe { rb_sys::rb_obj_as_string(raw(value)) })
    }

    fn is_instance_of(&self, value: Value, class: Value) -> bool {
        unsafe { rb_sys::rb_obj_is_instance_of(raw(value), raw(class)) == Qtrue as VALUE }
    }

    fn gc_register(&self, value: Value) {
        let value = raw(value);
        let mut roots = self.roots.lock();
        let pinned = roots.entry(value).or_insert_with(|| {
            let mut slot = Box::new(value);
            unsafe { rb_sys::rb_gc_register_address(&mut *slot) };
            Pinned { slot, count: 0 }
        });
        pinned.count += 1;
    }

    fn gc_unregister(&self, value: Value) {
        let value = raw(value);
        let mut roots = self.roots.lock();
        let Some(pinned) = roots.get_mut(&value) else {
            return;
        };
        pinned.count -= 1;
        if pinned.count == 0 {
            if let Some(mut pinned) = roots.remove(&value) {
                unsafe { rb_sys::rb_gc_unregister_address(&mut *pinned.slot) };
            }
        }
    }

    fn funcall(&self, receiver: Value, method: Id, args: &[Value]) -> Value {
        wrap(unsafe {
            rb_sys::rb_funcallv(
                raw(receiver),
                method.to_bits() as ID,
                args.len() as c_int,
                args.as_ptr() as *const VALUE,
            )
        })
    }

    fn path_to_class(&self, path: &str) -> Value {
        let path = self.str_new(path);
        wrap(unsafe { rb_sys::rb_path_to_class(raw(path)) })
    }

    fn class_new_instance(&self, class: Value, args: &[Value]) -> Value {
        wrap(unsafe {
            rb_sys::rb_class_new_instance(args.len() as c_int, args.as_ptr() as *const VALUE, raw(class))
        })
    }

    fn require(&self, feature: &str) -> Value {
        let feature = self.str_new(feature);
        let require = self.intern("require");
        self.funcall(self.nil(), require, &[feature])
    }

    fn set_script_name(&self, name: &str) {
        let name = self.str_new(name);
        unsafe { rb_sys::ruby_set_script_name(raw(name)) };
    }

    fn push_load_path(&self, path: &Path) {
        let path = self.str_new(&path.to_string_lossy());
        unsafe {
            let load_path = rb_sys::rb_gv_get(b"$LOAD_PATH\0".as_ptr() as *const c_char);
            rb_sys::rb_ary_push(load_path, raw(path));
        }
    }

    fn cleanup(&self, exit_code: i32) -> i32 {
        let mut roots = self.roots.lock();
        for (_, mut pinned) in roots.drain() {
            unsafe { rb_sys::rb_gc_unregister_address(&mut *pinned.slot) };
        }
        drop(roots);
        let status = unsafe { rb_sys::ruby_cleanup(exit_code) };
        tracing::info!(exit_code, status, "ruby VM finalized");
        status
    }
}
