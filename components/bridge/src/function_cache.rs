//! Deduplicated references to script functions held by the host.

use core_types::{FunctionId, SlotTable};
use script_engine::{GlobalId, ObjectRef};
use std::collections::HashMap;

#[derive(Debug)]
struct CachedFunction {
    function: ObjectRef,
    global: GlobalId,
    refs: u32,
}

/// Result of [`FunctionCache::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The id was stale
    Invalid,
    /// Other holders remain
    Retained,
    /// Last holder gone; the caller resets the global
    Dropped(GlobalId),
}

/// Function references keyed by function identity.
///
/// Retaining the same function twice returns the same id; the entry lives
/// until every retain is matched by a release.
#[derive(Debug, Default)]
pub struct FunctionCache {
    bank: SlotTable<CachedFunction>,
    by_function: HashMap<ObjectRef, FunctionId>,
}

impl FunctionCache {
    /// Returns the id already caching `function`, bumping its refcount.
    pub fn retain_existing(&mut self, function: ObjectRef) -> Option<FunctionId> {
        let id = *self.by_function.get(&function)?;
        let entry = self.bank.get_mut(id.0)?;
        entry.refs += 1;
        Some(id)
    }

    /// Caches `function` under a new id with one reference.
    pub fn insert(&mut self, function: ObjectRef, global: GlobalId) -> FunctionId {
        let id = FunctionId(self.bank.insert(CachedFunction {
            function,
            global,
            refs: 1,
        }));
        self.by_function.insert(function, id);
        id
    }

    /// The global holding a cached function.
    pub fn global(&self, id: FunctionId) -> Option<GlobalId> {
        self.bank.get(id.0).map(|entry| entry.global)
    }

    /// Drops one reference.
    pub fn release(&mut self, id: FunctionId) -> Release {
        let Some(entry) = self.bank.get_mut(id.0) else {
            return Release::Invalid;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return Release::Retained;
        }
        let function = entry.function;
        let global = entry.global;
        self.bank.remove(id.0);
        self.by_function.remove(&function);
        Release::Dropped(global)
    }

    /// Removes every entry and returns their globals.
    pub fn drain(&mut self) -> Vec<GlobalId> {
        let globals = self.bank.iter().map(|(_, entry)| entry.global).collect();
        self.bank = SlotTable::new();
        self.by_function.clear();
        globals
    }

    /// Number of cached functions.
    pub fn len(&self) -> usize {
        self.bank.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.bank.is_empty()
    }
}
