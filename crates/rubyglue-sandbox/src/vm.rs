//! The sandbox VM
//!
//! [`Sandbox`] owns a [`GlobalLock`] and the interpreter state. Every
//! embedding-API entry point checks that the calling thread owns the lock and
//! panics otherwise, so a bridge bug surfaces as a test failure instead of a
//! data race.
//!
//! A raised exception is stored in `$!` and then unwinds the native stack
//! with a private payload; [`Runtime::protect`] is the only place that
//! catches it. Foreign panics pass through `protect` untouched.
//!
//! The internal state mutex is held only for short bookkeeping sections,
//! never across a method body, program, feature or unwind.

use crate::builtins;
use crate::class::{Arity, ClassDef, Method};
use crate::error::{SandboxError, SandboxResult};
use crate::heap::{ExceptionData, Heap, HeapObject, ObjectKind, FALSE, NIL, TRUE};
use crate::script::{feature_key, Resolved, ScriptContext, Scripts};
use parking_lot::{Mutex, MutexGuard};
use rubyglue::{GlobalLock, Id, ProtectState, Runtime, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Unwind payload of a raised VM exception
struct Raised;

/// Label of a file's top-level frame
const TOP_REQUIRED: &str = "<top (required)>";

/// Label of an evaluated program's frame
const MAIN: &str = "<main>";

#[derive(Debug, Clone)]
struct Frame {
    file: String,
    line: i64,
    label: String,
}

impl Frame {
    fn render(&self) -> String {
        format!("{}:{}:in `{}'", self.file, self.line, self.label)
    }
}

/// Classes the VM itself allocates instances of
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoreClasses {
    pub object: Value,
    pub module: Value,
    pub class: Value,
    pub integer: Value,
    pub string: Value,
    pub array: Value,
    pub exception: Value,
    pub name_error: Value,
}

struct State {
    heap: Heap,
    symbols: Vec<String>,
    symbol_ids: HashMap<String, Id>,
    /// Global constant table: class path to class
    constants: HashMap<String, Value>,
    core: CoreClasses,
    frames: Vec<Frame>,
    /// `$!`
    errinfo: Value,
    scripts: Scripts,
    script_name: String,
    finalized: bool,
}

fn boot_class(
    heap: &mut Heap,
    constants: &mut HashMap<String, Value>,
    class_class: Value,
    path: &str,
    superclass: Option<Value>,
) -> Value {
    let class = heap.allocate(class_class, ObjectKind::Class(ClassDef::class(path, superclass)));
    constants.insert(path.to_string(), class);
    class
}

impl State {
    fn boot() -> Self {
        let mut heap = Heap::new();
        let mut constants = HashMap::new();

        // The metaclass of these four is patched in once Class exists
        let basic_object = boot_class(&mut heap, &mut constants, NIL, "BasicObject", None);
        let object = boot_class(&mut heap, &mut constants, NIL, "Object", Some(basic_object));
        let module = boot_class(&mut heap, &mut constants, NIL, "Module", Some(object));
        let class = boot_class(&mut heap, &mut constants, NIL, "Class", Some(module));
        for value in [basic_object, object, module, class] {
            if let Some(entry) = heap.get_mut(value) {
                entry.class = class;
            }
        }

        let mut define = |path: &str, superclass: Value| {
            boot_class(&mut heap, &mut constants, class, path, Some(superclass))
        };
        let nil_class = define("NilClass", object);
        let true_class = define("TrueClass", object);
        let false_class = define("FalseClass", object);
        let integer = define("Integer", object);
        let string = define("String", object);
        let array = define("Array", object);

        let exception = define("Exception", object);
        let script_error = define("ScriptError", exception);
        define("LoadError", script_error);
        define("SyntaxError", script_error);
        let standard_error = define("StandardError", exception);
        define("RuntimeError", standard_error);
        define("ArgumentError", standard_error);
        define("TypeError", standard_error);
        let name_error = define("NameError", standard_error);
        define("NoMethodError", name_error);

        for (value, class) in [(NIL, nil_class), (TRUE, true_class), (FALSE, false_class)] {
            if let Some(entry) = heap.get_mut(value) {
                entry.class = class;
            }
        }

        Self {
            heap,
            symbols: Vec::new(),
            symbol_ids: HashMap::new(),
            constants,
            core: CoreClasses {
                object,
                module,
                class,
                integer,
                string,
                array,
                exception,
                name_error,
            },
            frames: Vec::new(),
            errinfo: NIL,
            scripts: Scripts::default(),
            script_name: "-".to_string(),
            finalized: false,
        }
    }

    fn intern(&mut self, name: &str) -> Id {
        if let Some(&id) = self.symbol_ids.get(name) {
            return id;
        }
        let id = Id::from_bits(self.symbols.len() as u64);
        self.symbols.push(name.to_string());
        self.symbol_ids.insert(name.to_string(), id);
        id
    }

    fn symbol_name(&self, id: Id) -> String {
        self.symbols
            .get(id.to_bits() as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn object(&self, value: Value) -> Option<&HeapObject> {
        self.heap.get(value)
    }

    fn class_of(&self, value: Value) -> Value {
        self.object(value).map_or(NIL, |object| object.class)
    }

    fn class_def(&self, value: Value) -> Option<&ClassDef> {
        match &self.object(value)?.kind {
            ObjectKind::Class(def) => Some(def),
            _ => None,
        }
    }

    fn class_def_mut(&mut self, value: Value) -> Option<&mut ClassDef> {
        match &mut self.heap.get_mut(value)?.kind {
            ObjectKind::Class(def) => Some(def),
            _ => None,
        }
    }

    fn path_of(&self, class: Value) -> String {
        self.class_def(class)
            .map(|def| def.path.clone())
            .unwrap_or_default()
    }

    /// Resolve a constant path such as `Net::HTTP`: the global table first,
    /// then segment by segment through namespace constants
    fn resolve(&self, path: &str) -> Option<Value> {
        if let Some(&value) = self.constants.get(path) {
            return Some(value);
        }
        let mut segments = path.split("::");
        let mut current = *self.constants.get(segments.next()?)?;
        for segment in segments {
            current = *self.class_def(current)?.constants.get(segment)?;
        }
        Some(current)
    }

    /// Method lookup along the superclass chain
    fn find_method(&self, class: Value, id: Id) -> Option<Method> {
        let mut current = Some(class);
        while let Some(class) = current {
            let def = self.class_def(class)?;
            if let Some(method) = def.methods.get(&id) {
                return Some(method.clone());
            }
            current = def.superclass;
        }
        None
    }

    fn is_subclass(&self, class: Value, ancestor: Value) -> bool {
        let mut current = Some(class);
        while let Some(class) = current {
            if class == ancestor {
                return true;
            }
            current = self.class_def(class).and_then(|def| def.superclass);
        }
        false
    }

    /// Receiver description used in `NoMethodError` messages
    fn describe(&self, value: Value) -> String {
        if value == NIL {
            return "nil".to_string();
        }
        if value == TRUE {
            return "true".to_string();
        }
        if value == FALSE {
            return "false".to_string();
        }
        match self.class_def(value) {
            Some(def) if def.is_module => format!("module {}", def.path),
            Some(def) => format!("class {}", def.path),
            None => format!("an instance of {}", self.path_of(self.class_of(value))),
        }
    }

    /// File and line of the innermost frame
    fn position(&self) -> (String, i64) {
        match self.frames.last() {
            Some(frame) => (frame.file.clone(), frame.line),
            None => (self.script_name.clone(), 0),
        }
    }

    /// Rendered frames, innermost first
    fn backtrace(&self) -> Vec<String> {
        self.frames.iter().rev().map(Frame::render).collect()
    }
}

/// In-process VM implementing the embedding API
pub struct Sandbox {
    lock: GlobalLock,
    state: Mutex<State>,
}

/// Pops its frame when dropped, including during an unwind
pub(crate) struct FrameGuard<'a> {
    vm: &'a Sandbox,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        // No lock assertion here: a panic inside an unwind would abort
        self.vm.state.lock().frames.pop();
    }
}

impl Sandbox {
    /// Boot a VM with the core class hierarchy and builtin methods
    pub fn new() -> Self {
        let vm = Self {
            lock: GlobalLock::new(),
            state: Mutex::new(State::boot()),
        };
        builtins::install(&vm);
        tracing::debug!(objects = vm.live_objects(), "sandbox VM booted");
        vm
    }

    /// The VM's global execution lock
    pub fn lock(&self) -> &GlobalLock {
        &self.lock
    }

    /// State access for embedding-API calls: the lock must be owned and the
    /// VM not finalized.
    fn state(&self) -> MutexGuard<'_, State> {
        assert!(
            self.lock.is_owned_by_current_thread(),
            "VM accessed without holding the global execution lock"
        );
        let state = self.state.lock();
        assert!(!state.finalized, "VM accessed after cleanup");
        state
    }

    /// State access for the host API: takes the lock itself
    fn host<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        self.lock.execute(|| f(&mut self.state.lock()))
    }

    pub(crate) fn core(&self) -> CoreClasses {
        self.host(|state| state.core)
    }

    // ========================================================================
    // Host API: definitions
    // ========================================================================

    /// Define (or reopen) the class at `path`, inheriting from `superclass`
    /// (default `Object`).
    pub fn define_class(&self, path: &str, superclass: Option<&str>) -> SandboxResult<Value> {
        self.define_class_in(None, path, superclass)
    }

    /// Define a class inside `namespace`, or globally when `namespace` is
    /// `None`. Programs pass [`ScriptContext::wrap`] here so an anonymous
    /// `load` keeps its classes out of the global namespace.
    pub fn define_class_in(
        &self,
        namespace: Option<Value>,
        name: &str,
        superclass: Option<&str>,
    ) -> SandboxResult<Value> {
        self.host(|state| {
            if state.finalized {
                return Err(SandboxError::Finalized);
            }
            let superclass_path = superclass.unwrap_or("Object");
            let parent = state
                .resolve(superclass_path)
                .ok_or_else(|| SandboxError::UnknownClass(superclass_path.to_string()))?;
            if state.class_def(parent).map_or(true, |def| def.is_module) {
                return Err(SandboxError::WrongKind {
                    path: superclass_path.to_string(),
                    expected: "class",
                });
            }

            let (path, existing) = match namespace {
                Some(namespace) => {
                    let def = state.class_def(namespace).ok_or(SandboxError::NotAClass)?;
                    (
                        format!("{}::{}", def.path, name),
                        def.constants.get(name).copied(),
                    )
                }
                None => (name.to_string(), state.constants.get(name).copied()),
            };
            if let Some(existing) = existing {
                return match state.class_def(existing) {
                    Some(def) if !def.is_module => Ok(existing),
                    _ => Err(SandboxError::WrongKind {
                        path,
                        expected: "class",
                    }),
                };
            }

            let class_class = state.core.class;
            let class = state
                .heap
                .allocate(class_class, ObjectKind::Class(ClassDef::class(path.clone(), Some(parent))));
            match namespace.and_then(|namespace| state.class_def_mut(namespace)) {
                Some(def) => {
                    def.constants.insert(name.to_string(), class);
                }
                None => {
                    state.constants.insert(path.clone(), class);
                }
            }
            tracing::debug!(%path, superclass = superclass_path, "class defined");
            Ok(class)
        })
    }

    /// Define (or reopen) the module at `path`
    pub fn define_module(&self, path: &str) -> SandboxResult<Value> {
        self.host(|state| {
            if state.finalized {
                return Err(SandboxError::Finalized);
            }
            if let Some(&existing) = state.constants.get(path) {
                return match state.class_def(existing) {
                    Some(def) if def.is_module => Ok(existing),
                    _ => Err(SandboxError::WrongKind {
                        path: path.to_string(),
                        expected: "module",
                    }),
                };
            }
            let module_class = state.core.module;
            let module = state
                .heap
                .allocate(module_class, ObjectKind::Class(ClassDef::module(path)));
            state.constants.insert(path.to_string(), module);
            tracing::debug!(path, "module defined");
            Ok(module)
        })
    }

    /// Define instance method `name` on `owner`
    pub fn define_method<F>(&self, owner: Value, name: &str, arity: Arity, body: F) -> SandboxResult<()>
    where
        F: Fn(&Sandbox, Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.host(|state| {
            let id = state.intern(name);
            let def = state.class_def_mut(owner).ok_or(SandboxError::NotAClass)?;
            def.methods.insert(
                id,
                Method {
                    arity,
                    body: Arc::new(body),
                },
            );
            Ok(())
        })
    }

    /// Define a top-level function (a method on `Object`, callable with a
    /// nil receiver)
    pub fn define_global_function<F>(&self, name: &str, arity: Arity, body: F) -> SandboxResult<()>
    where
        F: Fn(&Sandbox, Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        let object = self.core().object;
        self.define_method(object, name, arity, body)
    }

    /// Register the program run for `source` by `eval`, `load` and
    /// file-backed `require`
    pub fn define_program<F>(&self, source: &str, program: F)
    where
        F: Fn(&Sandbox, &ScriptContext) -> Value + Send + Sync + 'static,
    {
        self.host(|state| state.scripts.define_program(source, Arc::new(program)));
    }

    /// Make `name` requirable; `feature` runs on its first `require`
    pub fn provide_feature<F>(&self, name: &str, feature: F)
    where
        F: Fn(&Sandbox) + Send + Sync + 'static,
    {
        self.host(|state| state.scripts.provide_feature(name, Arc::new(feature)));
    }

    /// Class or module bound to a constant path such as `Net::HTTP`
    pub fn class_named(&self, path: &str) -> Option<Value> {
        self.host(|state| state.resolve(path))
    }

    // ========================================================================
    // Host API: helpers for method and program bodies
    // ========================================================================

    /// Instance variable of `object`; nil when unset
    pub fn ivar_get(&self, object: Value, name: &str) -> Value {
        self.host(|state| {
            state
                .object(object)
                .and_then(|entry| entry.ivars.get(name).copied())
                .unwrap_or(NIL)
        })
    }

    /// Set an instance variable of `object`
    pub fn ivar_set(&self, object: Value, name: &str, value: Value) {
        self.host(|state| {
            if let Some(entry) = state.heap.get_mut(object) {
                entry.ivars.insert(name.to_string(), value);
            }
        });
    }

    /// Move the innermost frame to `line`, so a later raise reports it
    pub fn at_line(&self, line: i64) {
        if let Some(frame) = self.state().frames.last_mut() {
            frame.line = line;
        }
    }

    /// Raise a new `class_path` exception; an unknown path raises
    /// `NameError` instead. Must run inside a protected call.
    pub fn raise_error(&self, class_path: &str, message: impl AsRef<str>) -> ! {
        let (class, name_error) = {
            let state = self.state();
            (state.resolve(class_path), state.core.name_error)
        };
        match class {
            Some(class) => self.raise(class, message.as_ref()),
            None => self.raise(name_error, &format!("uninitialized constant {}", class_path)),
        }
    }

    /// Raise an existing exception object, stamping its backtrace if it has
    /// none yet. Must run inside a protected call.
    pub fn raise_exception(&self, exception: Value) -> ! {
        {
            let mut state = self.state();
            let backtrace = state.backtrace();
            if let Some(HeapObject {
                kind: ObjectKind::Exception(data),
                ..
            }) = state.heap.get_mut(exception)
            {
                if data.backtrace.is_none() {
                    data.backtrace = Some(backtrace);
                }
            }
            state.errinfo = exception;
        }
        tracing::trace!(?exception, "exception raised");
        panic::resume_unwind(Box::new(Raised))
    }

    // ========================================================================
    // Host API: introspection
    // ========================================================================

    /// Run a full mark/sweep collection; returns the number of freed objects
    pub fn gc(&self) -> usize {
        self.host(|state| {
            let extra: Vec<Value> = state
                .constants
                .values()
                .copied()
                .chain([state.errinfo])
                .collect();
            let freed = state.heap.collect(extra);
            tracing::debug!(freed, live = state.heap.live_count(), "garbage collected");
            freed
        })
    }

    /// Check if `value` survived every collection so far
    pub fn is_live(&self, value: Value) -> bool {
        self.host(|state| state.heap.is_live(value))
    }

    /// Number of live heap objects
    pub fn live_objects(&self) -> usize {
        self.host(|state| state.heap.live_count())
    }

    /// Number of registered GC roots
    pub fn root_count(&self) -> usize {
        self.host(|state| state.heap.root_count())
    }

    /// Current `$0`
    pub fn script_name(&self) -> String {
        self.host(|state| state.script_name.clone())
    }

    /// Feature load path, in search order
    pub fn load_path(&self) -> Vec<PathBuf> {
        self.host(|state| state.scripts.load_path().to_vec())
    }

    /// Features loaded so far, sorted
    pub fn loaded_features(&self) -> Vec<String> {
        self.host(|state| state.scripts.loaded_features())
    }

    /// Check if `cleanup` has run
    pub fn is_finalized(&self) -> bool {
        self.host(|state| state.finalized)
    }

    // ========================================================================
    // Internals shared with the builtins
    // ========================================================================

    fn push_frame(&self, label: String) -> FrameGuard<'_> {
        let mut state = self.state();
        let (file, line) = state.position();
        state.frames.push(Frame { file, line, label });
        FrameGuard { vm: self }
    }

    fn push_frame_at(&self, file: String, line: i64, label: &str) -> FrameGuard<'_> {
        self.state().frames.push(Frame {
            file,
            line,
            label: label.to_string(),
        });
        FrameGuard { vm: self }
    }

    pub(crate) fn exception_data(&self, value: Value) -> Option<ExceptionData> {
        match &self.state().object(value)?.kind {
            ObjectKind::Exception(data) => Some(data.clone()),
            _ => None,
        }
    }

    pub(crate) fn set_exception_message(&self, value: Value, message: String) {
        if let Some(HeapObject {
            kind: ObjectKind::Exception(data),
            ..
        }) = self.state().heap.get_mut(value)
        {
            data.message = Some(message);
        }
    }

    /// `#<ClassPath>`
    pub(crate) fn default_to_s(&self, value: Value) -> String {
        let state = self.state();
        format!("#<{}>", state.path_of(state.class_of(value)))
    }

    /// Fresh anonymous module wrapping an anonymous `load`
    fn new_anonymous_module(&self) -> Value {
        let mut state = self.state();
        let module_class = state.core.module;
        let module = state
            .heap
            .allocate(module_class, ObjectKind::Class(ClassDef::module(String::new())));
        if let Some(def) = state.class_def_mut(module) {
            def.path = format!("#<Module:{:#x}>", module.to_bits());
        }
        module
    }

    /// Run the program registered for `source`. *May raise.*
    fn run_program(&self, source: &str, context: &ScriptContext, label: &str) -> Value {
        let program = self.state().scripts.program(source);
        let Some(program) = program else {
            self.raise_error(
                "SyntaxError",
                format!("{}:{}: syntax error, unexpected input", context.filename, context.line),
            )
        };
        let _frame = self.push_frame_at(context.filename.clone(), context.line, label);
        program(self, context)
    }

    /// Read and run a script file. *May raise.*
    fn run_file(&self, path: &str, wrap: Option<Value>) -> Value {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                tracing::debug!(path, %err, "script file unreadable");
                self.raise_error("LoadError", format!("cannot load such file -- {}", path))
            }
        };
        let context = ScriptContext {
            filename: path.to_string(),
            line: 1,
            binding: NIL,
            wrap,
        };
        self.run_program(&source, &context, TOP_REQUIRED)
    }

    /// `Kernel#eval` body. *May raise.*
    pub(crate) fn eval_program(&self, code: &str, binding: Value, filename: &str, line: i64) -> Value {
        let context = ScriptContext {
            filename: filename.to_string(),
            line,
            binding,
            wrap: None,
        };
        self.run_program(code, &context, MAIN)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("lock_owner", &self.lock.owner())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Embedding API
// ============================================================================

impl Runtime for Sandbox {
    fn thread_has_lock(&self) -> bool {
        self.lock.is_owned_by_current_thread()
    }

    fn call_with_lock(&self, f: &mut dyn FnMut()) {
        self.lock.execute(f)
    }

    fn protect(&self, f: &mut dyn FnMut() -> Value) -> Result<Value, ProtectState> {
        let depth = self.state().frames.len();
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) if payload.is::<Raised>() => {
                self.state.lock().frames.truncate(depth);
                Err(ProtectState::RAISE)
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn load_protect(&self, path: &str, anonymous: bool) -> Result<(), ProtectState> {
        self.protect(&mut || {
            let wrap = anonymous.then(|| self.new_anonymous_module());
            self.run_file(path, wrap);
            NIL
        })
        .map(|_| ())
    }

    fn current_exception(&self) -> Value {
        self.state().errinfo
    }

    fn clear_exception(&self) {
        self.state().errinfo = NIL;
    }

    fn raise(&self, class: Value, message: &str) -> ! {
        let exception = {
            let mut state = self.state();
            let backtrace = state.backtrace();
            state.heap.allocate(
                class,
                ObjectKind::Exception(ExceptionData {
                    message: Some(message.to_string()),
                    backtrace: Some(backtrace),
                }),
            )
        };
        self.raise_exception(exception)
    }

    fn nil(&self) -> Value {
        NIL
    }

    fn truthy(&self, value: Value) -> bool {
        value != NIL && value != FALSE
    }

    fn intern(&self, name: &str) -> Id {
        self.state().intern(name)
    }

    fn str_new(&self, s: &str) -> Value {
        let mut state = self.state();
        let class = state.core.string;
        state.heap.allocate(class, ObjectKind::String(s.to_string()))
    }

    fn int_new(&self, n: i64) -> Value {
        let mut state = self.state();
        let class = state.core.integer;
        state.heap.allocate(class, ObjectKind::Integer(n))
    }

    fn string_value(&self, value: Value) -> Option<String> {
        match &self.state().object(value)?.kind {
            ObjectKind::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn int_value(&self, value: Value) -> Option<i64> {
        match self.state().object(value)?.kind {
            ObjectKind::Integer(n) => Some(n),
            _ => None,
        }
    }

    fn array_new(&self) -> Value {
        let mut state = self.state();
        let class = state.core.array;
        state.heap.allocate(class, ObjectKind::Array(Vec::new()))
    }

    fn array_push(&self, array: Value, value: Value) {
        if let Some(HeapObject {
            kind: ObjectKind::Array(items),
            ..
        }) = self.state().heap.get_mut(array)
        {
            items.push(value);
        }
    }

    fn array_len(&self, array: Value) -> usize {
        match &self.state().object(array).map(|entry| &entry.kind) {
            Some(ObjectKind::Array(items)) => items.len(),
            _ => 0,
        }
    }

    fn array_entry(&self, array: Value, index: usize) -> Value {
        match &self.state().object(array).map(|entry| &entry.kind) {
            Some(ObjectKind::Array(items)) => items.get(index).copied().unwrap_or(NIL),
            _ => NIL,
        }
    }

    fn array_delete_at(&self, array: Value, index: usize) -> Value {
        match self.state().heap.get_mut(array) {
            Some(HeapObject {
                kind: ObjectKind::Array(items),
                ..
            }) if index < items.len() => items.remove(index),
            _ => NIL,
        }
    }

    fn class_of(&self, value: Value) -> Value {
        self.state().class_of(value)
    }

    fn class_path(&self, class: Value) -> Value {
        let path = self.state().path_of(class);
        self.str_new(&path)
    }

    fn obj_as_string(&self, value: Value) -> Value {
        if self.string_value(value).is_some() {
            return value;
        }
        let to_s = self.intern("to_s");
        let text = self.funcall(value, to_s, &[]);
        if self.string_value(text).is_some() {
            text
        } else {
            let fallback = self.default_to_s(value);
            self.str_new(&fallback)
        }
    }

    fn is_instance_of(&self, value: Value, class: Value) -> bool {
        self.state().class_of(value) == class
    }

    fn gc_register(&self, value: Value) {
        self.state().heap.register_root(value);
    }

    fn gc_unregister(&self, value: Value) {
        self.state().heap.unregister_root(value);
    }

    fn funcall(&self, receiver: Value, method: Id, args: &[Value]) -> Value {
        let (found, name) = {
            let state = self.state();
            let found = state.find_method(state.class_of(receiver), method);
            (found, state.symbol_name(method))
        };
        let Some(found) = found else {
            let description = self.state().describe(receiver);
            self.raise_error(
                "NoMethodError",
                format!("undefined method `{}' for {}", name, description),
            )
        };
        if !found.arity.accepts(args.len()) {
            self.raise_error(
                "ArgumentError",
                format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    found.arity
                ),
            );
        }
        let _frame = self.push_frame(name);
        (found.body)(self, receiver, args)
    }

    fn path_to_class(&self, path: &str) -> Value {
        let found = {
            let state = self.state();
            state
                .resolve(path)
                .map(|value| (value, state.class_def(value).is_some()))
        };
        match found {
            Some((class, true)) => class,
            Some(_) => self.raise_error("TypeError", format!("{} does not refer to class/module", path)),
            None => self.raise_error("ArgumentError", format!("undefined class/module {}", path)),
        }
    }

    fn class_new_instance(&self, class: Value, args: &[Value]) -> Value {
        let kind = {
            let state = self.state();
            match state.class_def(class) {
                Some(def) if !def.is_module => {
                    if state.is_subclass(class, state.core.exception) {
                        Some(ObjectKind::Exception(ExceptionData::default()))
                    } else {
                        Some(ObjectKind::Plain)
                    }
                }
                _ => None,
            }
        };
        let Some(kind) = kind else {
            let description = self.state().describe(class);
            self.raise_error("TypeError", format!("cannot instantiate {}", description))
        };
        let object = self.state().heap.allocate(class, kind);
        let initialize = self.intern("initialize");
        self.funcall(object, initialize, args);
        object
    }

    fn require(&self, feature: &str) -> Value {
        let key = feature_key(feature).to_string();
        let resolved = self.state().scripts.resolve(&key);
        match resolved {
            Resolved::AlreadyLoaded => FALSE,
            Resolved::Feature(body) => {
                {
                    let _frame = self.push_frame_at(format!("{}.rb", key), 1, TOP_REQUIRED);
                    body(self);
                }
                self.state().scripts.mark_loaded(&key);
                tracing::debug!(feature = %key, "feature required");
                TRUE
            }
            Resolved::File(path) => {
                self.run_file(&path.display().to_string(), None);
                self.state().scripts.mark_loaded(&key);
                tracing::debug!(feature = %key, path = %path.display(), "script required");
                TRUE
            }
            Resolved::Missing => {
                self.raise_error("LoadError", format!("cannot load such file -- {}", feature))
            }
        }
    }

    fn set_script_name(&self, name: &str) {
        self.state().script_name = name.to_string();
    }

    fn push_load_path(&self, path: &Path) {
        self.state().scripts.push_load_path(path);
    }

    fn cleanup(&self, exit_code: i32) -> i32 {
        let mut state = self.state();
        state.frames.clear();
        state.errinfo = NIL;
        state.finalized = true;
        tracing::info!(exit_code, "sandbox VM finalized");
        exit_code
    }
}
