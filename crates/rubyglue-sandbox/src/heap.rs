//! Object heap and mark/sweep collector
//!
//! Every sandbox value lives in a heap slot; a [`Value`]'s bits are its slot
//! index. Slots are never reused, so a collected value stays dead instead of
//! aliasing a newer object.
//!
//! Roots are:
//! - the three immortal slots (nil, true, false)
//! - explicitly registered GC roots (see `gc_register`)
//! - extra roots supplied by the caller (constants, the current exception)

use crate::class::ClassDef;
use rubyglue::Value;
use std::collections::HashMap;

/// Slot of `nil`
pub(crate) const NIL: Value = Value::from_bits(0);
/// Slot of `true`
pub(crate) const TRUE: Value = Value::from_bits(1);
/// Slot of `false`
pub(crate) const FALSE: Value = Value::from_bits(2);

const IMMORTAL_SLOTS: usize = 3;

/// Exception payload
#[derive(Debug, Clone, Default)]
pub(crate) struct ExceptionData {
    pub message: Option<String>,
    /// Rendered frames, innermost first; set when the exception is raised
    pub backtrace: Option<Vec<String>>,
}

/// What a heap object is
pub(crate) enum ObjectKind {
    Nil,
    True,
    False,
    Integer(i64),
    String(String),
    Array(Vec<Value>),
    Class(ClassDef),
    Exception(ExceptionData),
    Plain,
}

/// One heap object
pub(crate) struct HeapObject {
    pub class: Value,
    pub kind: ObjectKind,
    pub ivars: HashMap<String, Value>,
}

impl HeapObject {
    fn children(&self) -> impl Iterator<Item = Value> + '_ {
        let nested: Box<dyn Iterator<Item = Value> + '_> = match &self.kind {
            ObjectKind::Array(items) => Box::new(items.iter().copied()),
            ObjectKind::Class(def) => {
                Box::new(def.superclass.into_iter().chain(def.constants.values().copied()))
            }
            _ => Box::new(std::iter::empty()),
        };
        std::iter::once(self.class)
            .chain(self.ivars.values().copied())
            .chain(nested)
    }
}

/// Slot heap with a registered root set
pub(crate) struct Heap {
    slots: Vec<Option<HeapObject>>,
    /// Registered roots with their registration counts
    roots: HashMap<Value, usize>,
}

impl Heap {
    /// Heap holding the immortal nil/true/false slots. Their class is patched
    /// in once the core classes exist.
    pub fn new() -> Self {
        let mut heap = Self {
            slots: Vec::new(),
            roots: HashMap::new(),
        };
        heap.allocate(NIL, ObjectKind::Nil);
        heap.allocate(NIL, ObjectKind::True);
        heap.allocate(NIL, ObjectKind::False);
        heap
    }

    pub fn allocate(&mut self, class: Value, kind: ObjectKind) -> Value {
        let value = Value::from_bits(self.slots.len() as u64);
        self.slots.push(Some(HeapObject {
            class,
            kind,
            ivars: HashMap::new(),
        }));
        value
    }

    pub fn get(&self, value: Value) -> Option<&HeapObject> {
        self.slots.get(value.to_bits() as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, value: Value) -> Option<&mut HeapObject> {
        self.slots.get_mut(value.to_bits() as usize)?.as_mut()
    }

    pub fn is_live(&self, value: Value) -> bool {
        self.get(value).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn register_root(&mut self, value: Value) {
        *self.roots.entry(value).or_insert(0) += 1;
    }

    pub fn unregister_root(&mut self, value: Value) {
        if let Some(count) = self.roots.get_mut(&value) {
            *count -= 1;
            if *count == 0 {
                self.roots.remove(&value);
            }
        }
    }

    pub fn root_count(&self) -> usize {
        self.roots.values().sum()
    }

    /// Mark everything reachable from the roots and `extra_roots`, free the
    /// rest. Returns the number of freed objects.
    pub fn collect(&mut self, extra_roots: impl IntoIterator<Item = Value>) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut worklist: Vec<Value> = (0..IMMORTAL_SLOTS as u64).map(Value::from_bits).collect();
        worklist.extend(self.roots.keys().copied());
        worklist.extend(extra_roots);

        while let Some(value) = worklist.pop() {
            let index = value.to_bits() as usize;
            if index >= marked.len() || marked[index] {
                continue;
            }
            marked[index] = true;
            if let Some(object) = &self.slots[index] {
                worklist.extend(object.children());
            }
        }

        let mut freed = 0;
        for (slot, live) in self.slots.iter_mut().zip(marked) {
            if !live && slot.is_some() {
                *slot = None;
                freed += 1;
            }
        }
        freed
    }
}
