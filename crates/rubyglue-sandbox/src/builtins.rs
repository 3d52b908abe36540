//! Builtin methods of the core classes and `Kernel`

use crate::class::Arity;
use crate::error::{SandboxError, SandboxResult};
use crate::heap::NIL;
use crate::vm::Sandbox;
use rubyglue::{Runtime, Value};

pub(crate) fn install(vm: &Sandbox) {
    if let Err(err) = define_all(vm) {
        // Core classes are created by boot, so this is a broken build
        panic!("sandbox builtins failed to install: {}", err);
    }
}

fn class(vm: &Sandbox, path: &str) -> SandboxResult<Value> {
    vm.class_named(path)
        .ok_or_else(|| SandboxError::UnknownClass(path.to_string()))
}

/// Argument `index` as a host string, raising `TypeError` otherwise
fn string_arg(vm: &Sandbox, args: &[Value], index: usize) -> String {
    match args.get(index).and_then(|&arg| vm.string_value(arg)) {
        Some(s) => s,
        None => vm.raise_error("TypeError", "no implicit conversion into String"),
    }
}

fn define_all(vm: &Sandbox) -> SandboxResult<()> {
    define_object(vm)?;
    define_exception(vm)?;
    define_kernel(vm)
}

// ============================================================================
// Object model
// ============================================================================

fn define_object(vm: &Sandbox) -> SandboxResult<()> {
    let basic_object = class(vm, "BasicObject")?;
    vm.define_method(basic_object, "initialize", Arity::Exact(0), |_, _, _| NIL)?;

    let object = class(vm, "Object")?;
    vm.define_method(object, "to_s", Arity::Exact(0), |vm, this, _| {
        let text = vm.default_to_s(this);
        vm.str_new(&text)
    })?;
    vm.define_method(object, "class", Arity::Exact(0), |vm, this, _| vm.class_of(this))?;

    let module = class(vm, "Module")?;
    vm.define_method(module, "name", Arity::Exact(0), |vm, this, _| vm.class_path(this))?;

    let string = class(vm, "String")?;
    vm.define_method(string, "to_s", Arity::Exact(0), |_, this, _| this)?;
    vm.define_method(string, "length", Arity::Exact(0), |vm, this, _| {
        let s = vm.string_value(this).unwrap_or_default();
        vm.int_new(s.chars().count() as i64)
    })?;
    Ok(())
}

// ============================================================================
// Exceptions
// ============================================================================

fn define_exception(vm: &Sandbox) -> SandboxResult<()> {
    let exception = class(vm, "Exception")?;
    vm.define_method(exception, "initialize", Arity::Range(0, 1), |vm, this, args| {
        if let Some(&message) = args.first() {
            let text = vm.obj_as_string(message);
            vm.set_exception_message(this, vm.string_value(text).unwrap_or_default());
        }
        NIL
    })?;
    vm.define_method(exception, "to_s", Arity::Exact(0), |vm, this, _| {
        match vm.exception_data(this).and_then(|data| data.message) {
            Some(message) => vm.str_new(&message),
            None => vm.class_path(vm.class_of(this)),
        }
    })?;
    vm.define_method(exception, "backtrace", Arity::Exact(0), |vm, this, _| {
        match vm.exception_data(this).and_then(|data| data.backtrace) {
            Some(frames) => {
                let array = vm.array_new();
                for frame in frames {
                    let line = vm.str_new(&frame);
                    vm.array_push(array, line);
                }
                array
            }
            None => NIL,
        }
    })?;
    Ok(())
}

// ============================================================================
// Kernel
// ============================================================================

fn define_kernel(vm: &Sandbox) -> SandboxResult<()> {
    // eval(code, binding = nil, filename = "(eval)", line = 1)
    vm.define_global_function("eval", Arity::Range(1, 4), |vm, _, args| {
        let code = string_arg(vm, args, 0);
        let binding = args.get(1).copied().unwrap_or(NIL);
        let filename = args
            .get(2)
            .and_then(|&arg| vm.string_value(arg))
            .unwrap_or_else(|| "(eval)".to_string());
        let line = args.get(3).and_then(|&arg| vm.int_value(arg)).unwrap_or(1);
        vm.eval_program(&code, binding, &filename, line)
    })
}
