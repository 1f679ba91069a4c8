//! Object heap.
//!
//! Objects live in a [`SlotTable`] and are addressed by [`ObjectRef`]. The heap
//! itself knows nothing about roots; [`crate::Engine::collect_garbage`] marks
//! from the engine's roots and asks the heap to sweep.

use crate::{CallInfo, Engine, JsValue, ObjectRef, Thrown};
use core_types::{ErrorKind, HostPointer, SlotTable, StackFrame};
use indexmap::IndexMap;
use std::rc::Rc;

/// Behavior of a native function.
pub type NativeFn = Rc<dyn Fn(&Engine, &CallInfo) -> Result<JsValue, Thrown>>;

/// State of the single embedder slot carried by wrapper objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalField {
    /// The object was not created with an internal field
    Absent,
    /// The object has an internal field that holds nothing yet
    Unset,
    /// The internal field holds a host pointer
    Pointer(HostPointer),
}

impl InternalField {
    /// The stored pointer, if any.
    pub fn pointer(self) -> Option<HostPointer> {
        match self {
            InternalField::Pointer(p) => Some(p),
            _ => None,
        }
    }
}

/// An own property.
#[derive(Clone)]
pub(crate) enum Property {
    Data(JsValue),
    Accessor {
        getter: Option<ObjectRef>,
        setter: Option<ObjectRef>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    Plain,
    /// `instance_fields` marks constructors whose instances carry an internal field.
    Constructor { instance_fields: bool },
}

pub(crate) struct FunctionData {
    pub(crate) name: Rc<str>,
    pub(crate) behavior: NativeFn,
    pub(crate) data: JsValue,
    pub(crate) kind: FunctionKind,
    pub(crate) source_url: Option<Rc<str>>,
}

/// Settlement state of a promise object.
#[derive(Clone, Debug, PartialEq)]
pub enum PromiseState {
    /// Not settled yet
    Pending,
    /// Resolved with a value
    Fulfilled(JsValue),
    /// Rejected with a reason
    Rejected(JsValue),
}

pub(crate) enum ObjectKind {
    Ordinary,
    Array(Vec<JsValue>),
    Function(FunctionData),
    Error {
        kind: ErrorKind,
        frames: Vec<StackFrame>,
    },
    Promise(PromiseState),
}

pub(crate) struct HeapObject {
    pub(crate) kind: ObjectKind,
    pub(crate) properties: IndexMap<Rc<str>, Property>,
    pub(crate) prototype: Option<ObjectRef>,
    pub(crate) internal: InternalField,
    pub(crate) interceptor: Option<ObjectRef>,
    pub(crate) marked: bool,
}

impl HeapObject {
    pub(crate) fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            prototype,
            internal: InternalField::Absent,
            interceptor: None,
            marked: false,
        }
    }

    pub(crate) fn function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Pushes every object directly referenced by this one.
    pub(crate) fn trace(&self, out: &mut Vec<ObjectRef>) {
        fn push(value: &JsValue, out: &mut Vec<ObjectRef>) {
            if let JsValue::Object(obj) = value {
                out.push(*obj);
            }
        }

        out.extend(self.prototype);
        out.extend(self.interceptor);
        for property in self.properties.values() {
            match property {
                Property::Data(value) => push(value, out),
                Property::Accessor { getter, setter } => {
                    out.extend(*getter);
                    out.extend(*setter);
                }
            }
        }
        match &self.kind {
            ObjectKind::Array(items) => items.iter().for_each(|v| push(v, out)),
            ObjectKind::Function(data) => push(&data.data, out),
            ObjectKind::Promise(PromiseState::Fulfilled(v))
            | ObjectKind::Promise(PromiseState::Rejected(v)) => push(v, out),
            _ => {}
        }
    }
}

/// Slot-allocated object storage.
#[derive(Default)]
pub(crate) struct Heap {
    objects: SlotTable<HeapObject>,
    allocated_since_gc: usize,
}

impl Heap {
    pub(crate) fn alloc(&mut self, object: HeapObject) -> ObjectRef {
        self.allocated_since_gc += 1;
        ObjectRef(self.objects.insert(object))
    }

    pub(crate) fn get(&self, obj: ObjectRef) -> Option<&HeapObject> {
        self.objects.get(obj.0)
    }

    pub(crate) fn get_mut(&mut self, obj: ObjectRef) -> Option<&mut HeapObject> {
        self.objects.get_mut(obj.0)
    }

    pub(crate) fn is_marked(&self, obj: ObjectRef) -> bool {
        self.get(obj).is_some_and(|o| o.marked)
    }

    pub(crate) fn live(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    /// Marks everything reachable from `roots`.
    pub(crate) fn mark(&mut self, mut worklist: Vec<ObjectRef>) {
        while let Some(obj) = worklist.pop() {
            let Some(object) = self.objects.get_mut(obj.0) else {
                continue;
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            object.trace(&mut worklist);
        }
    }

    /// Frees unmarked objects, clears marks on survivors and returns the number freed.
    pub(crate) fn sweep(&mut self) -> usize {
        self.allocated_since_gc = 0;
        self.objects.retain(|_, object| std::mem::take(&mut object.marked))
    }
}
