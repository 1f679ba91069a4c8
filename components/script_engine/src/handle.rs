//! Local handles and persistent globals.
//!
//! Local handles root values for the duration of a [`HandleScope`]. Globals
//! root values until reset; a global made weak stops rooting its value and
//! instead fires a callback once the value has been collected.

use crate::{Engine, JsValue, ObjectRef};
use core_types::{HostPointer, SlotId, SlotTable};
use std::fmt;

/// Called after the target of a weak global has been collected.
///
/// The parameter is the host pointer registered with [`Engine::set_weak`].
pub type WeakCallback = fn(&Engine, HostPointer);

/// Stack of rooted local values.
#[derive(Default)]
pub(crate) struct HandleStack {
    values: Vec<JsValue>,
}

impl HandleStack {
    pub(crate) fn push(&mut self, value: JsValue) {
        self.values.push(value);
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    pub(crate) fn roots(&self, out: &mut Vec<ObjectRef>) {
        out.extend(self.values.iter().filter_map(JsValue::as_object));
    }
}

/// RAII scope for local handles.
///
/// Every handle pushed while the scope is open is released when it drops.
/// Closing the outermost scope outside of any call may trigger a collection.
pub struct HandleScope<'e> {
    engine: &'e Engine,
    mark: usize,
}

impl<'e> HandleScope<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        let mark = engine.handles.borrow().len();
        engine.open_scopes.set(engine.open_scopes.get() + 1);
        Self { engine, mark }
    }

    /// Roots `value` until this scope closes and returns it.
    pub fn handle(&self, value: JsValue) -> JsValue {
        self.engine.handles.borrow_mut().push(value.clone());
        value
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        self.engine.close_scope(self.mark);
    }
}

/// Id of a persistent global.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub(crate) SlotId);

impl fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalId({})", self.0)
    }
}

pub(crate) struct GlobalEntry {
    pub(crate) value: JsValue,
    pub(crate) weak: Option<(HostPointer, WeakCallback)>,
}

/// Table of persistent globals.
#[derive(Default)]
pub(crate) struct GlobalTable {
    entries: SlotTable<GlobalEntry>,
}

impl GlobalTable {
    pub(crate) fn insert(&mut self, value: JsValue) -> GlobalId {
        GlobalId(self.entries.insert(GlobalEntry { value, weak: None }))
    }

    pub(crate) fn get(&self, id: GlobalId) -> Option<&GlobalEntry> {
        self.entries.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: GlobalId) -> Option<&mut GlobalEntry> {
        self.entries.get_mut(id.0)
    }

    pub(crate) fn remove(&mut self, id: GlobalId) -> bool {
        self.entries.remove(id.0).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn strong_roots(&self, out: &mut Vec<ObjectRef>) {
        out.extend(
            self.entries
                .iter()
                .filter(|(_, entry)| entry.weak.is_none())
                .filter_map(|(_, entry)| entry.value.as_object()),
        );
    }

    /// Clears weak globals whose targets are about to be swept and returns their callbacks.
    pub(crate) fn clear_dead_weak(
        &mut self,
        is_live: impl Fn(ObjectRef) -> bool,
    ) -> Vec<(HostPointer, WeakCallback)> {
        let mut pending = Vec::new();
        for (_, entry) in self.entries.iter_mut() {
            let Some(target) = entry.value.as_object() else {
                continue;
            };
            if entry.weak.is_some() && !is_live(target) {
                entry.value = JsValue::Undefined;
                pending.extend(entry.weak.take());
            }
        }
        pending
    }
}
