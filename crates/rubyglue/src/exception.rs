//! Exception Translator
//!
//! Converts the VM's "current exception" into an [`ExceptionRecord`]: the
//! exception's class path, its string representation and its backtrace, one
//! `From    : <frame>` line per frame in the order the VM reports them
//! (innermost call first).

use crate::gvl::run_with_lock;
use crate::protect::protected_call;
use crate::runtime::Runtime;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every backtrace line
pub const FRAME_PREFIX: &str = "From    : ";

/// Host-side copy of a VM exception
///
/// Produced only when a protected call trapped an error. Immutable once
/// built; freely cloned and sent between threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    #[serde(rename = "type")]
    type_name: String,
    message: String,
    backtrace: String,
}

impl ExceptionRecord {
    /// Record with only a message (type and backtrace empty)
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            type_name: String::new(),
            message: message.into(),
            backtrace: String::new(),
        }
    }

    /// Set the exception class path
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Append one backtrace frame
    pub fn with_frame(mut self, frame: &str) -> Self {
        self.push_frame(frame);
        self
    }

    fn push_frame(&mut self, frame: &str) {
        self.backtrace.push_str(FRAME_PREFIX);
        self.backtrace.push_str(frame);
        self.backtrace.push('\n');
    }

    /// Runtime class path of the exception (e.g. `"NoMethodError"`)
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Exception message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace lines, each prefixed with [`FRAME_PREFIX`]
    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }

    /// Backtrace frames without the prefix
    pub fn frames(&self) -> impl Iterator<Item = &str> + '_ {
        self.backtrace
            .lines()
            .filter_map(|line| line.strip_prefix(FRAME_PREFIX))
    }

    /// Full report: type and message header followed by the backtrace
    pub fn stackdump(&self) -> String {
        format!(
            "Type    : {}\nMessage : {}\n{}",
            self.type_name, self.message, self.backtrace
        )
    }
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.type_name.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

impl std::error::Error for ExceptionRecord {}

/// Translate the VM's current exception into an [`ExceptionRecord`].
///
/// Call only right after a protected call reported an error. The pending
/// exception is consumed (reset to nil) once it has been read. If there is
/// no current exception, the record carries only `default_message`.
pub fn translate_current_error(rt: &dyn Runtime, default_message: Option<&str>) -> ExceptionRecord {
    run_with_lock(rt, || {
        let mut record = ExceptionRecord::new(default_message.unwrap_or_default());

        let exception = rt.current_exception();
        if rt.is_nil(exception) {
            tracing::debug!("no current exception to translate");
            return record;
        }

        let class_path = rt.class_path(rt.class_of(exception));
        record.type_name = rt.string_value(class_path).unwrap_or_default();

        if default_message.is_none() {
            record.message =
                describe(rt, exception).unwrap_or_else(|| record.type_name.clone());
        }

        for frame in backtrace_of(rt, exception) {
            record.push_frame(&frame);
        }

        rt.clear_exception();
        tracing::debug!(
            exception_type = %record.type_name,
            message = %record.message,
            "translated VM exception"
        );
        record
    })
}

/// `exception.to_s`, trapped: a failing `to_s` yields `None`
fn describe(rt: &dyn Runtime, exception: Value) -> Option<String> {
    let text = protected_call(rt, |rt| rt.obj_as_string(exception)).ok()?;
    rt.string_value(text)
}

/// `exception.backtrace`, trapped; empty when unset or not an array of strings
fn backtrace_of(rt: &dyn Runtime, exception: Value) -> Vec<String> {
    let backtrace = rt.intern("backtrace");
    let Ok(frames) = protected_call(rt, |rt| rt.funcall(exception, backtrace, &[])) else {
        return Vec::new();
    };
    (0..rt.array_len(frames))
        .filter_map(|index| rt.string_value(rt.array_entry(frames, index)))
        .collect()
}
