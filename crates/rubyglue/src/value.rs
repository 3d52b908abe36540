//! Opaque VM tokens
//!
//! A [`Value`] is a copyable handle to any VM-level value (object, class,
//! exception, array, ...). The bridge never gives it a static host type: its
//! bits mean whatever the runtime behind [`Runtime`](crate::Runtime) says they
//! mean. A value is only guaranteed to stay valid while it is reachable from a
//! rooted location, i.e. a native stack frame during a call or the
//! [`ObjectRegistry`](crate::ObjectRegistry).
//!
//! An [`Id`] is an interned method or constant name.

use std::fmt;

/// Opaque handle to one VM-level value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    /// Create from the runtime's raw representation
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get the runtime's raw representation
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:#x})", self.0)
    }
}

/// Interned method identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Id(u64);

impl Id {
    /// Create from the runtime's raw symbol number
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get the runtime's raw symbol number
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}
