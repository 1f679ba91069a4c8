//! The module graph.
//!
//! Modules live in a slot table and reference each other by [`ModuleId`], so
//! the parent/child graph may contain cycles without owning references.
//!
//! A module is registered in [`ModuleState::Loading`] before its body runs;
//! a `require` cycle reaching it again gets the partially filled exports.

use crate::BridgeError;
use core_types::{ModuleId, ScriptClassId, SlotTable};
use indexmap::IndexMap;
use script_engine::GlobalId;
use std::collections::HashMap;

/// Lifecycle state of a module.
///
/// Modules progress Loading → Loaded. Reload requests are tracked
/// separately and only accepted once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// The module body is running
    Loading,
    /// The module body completed
    Loaded,
}

/// Outcome of [`Environment::mark_as_reloading`](crate::Environment::mark_as_reloading).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadResult {
    /// The module will be reloaded on its next load
    Requested,
    /// The source did not change
    NoChanges,
    /// No module has this id
    NoSuchModule,
}

/// A cached module.
#[derive(Debug, Clone)]
pub struct ScriptModule {
    /// Resolved module id (source path, or loader name)
    pub id: String,
    /// Source file, `None` for built-in loader modules
    pub path: Option<String>,
    /// Lifecycle state
    pub state: ModuleState,
    /// Reload requested since the last load
    pub reload_requested: bool,
    /// Modules that required this one
    pub parents: Vec<ModuleId>,
    /// Modules this one required
    pub children: Vec<ModuleId>,
    /// Script class defined by the module's default export
    pub script_class: Option<ScriptClassId>,
    /// The script-side `module` object
    pub module_object: GlobalId,
    /// The current `module.exports`
    pub exports: GlobalId,
    pub(crate) resolver: Option<usize>,
    pub(crate) stamp: Option<u64>,
}

impl ScriptModule {
    /// Creates a module in the loading state.
    pub fn new(id: &str, path: Option<String>, module_object: GlobalId, exports: GlobalId) -> Self {
        Self {
            id: id.to_string(),
            path,
            state: ModuleState::Loading,
            reload_requested: false,
            parents: Vec::new(),
            children: Vec::new(),
            script_class: None,
            module_object,
            exports,
            resolver: None,
            stamp: None,
        }
    }

    /// Whether the module body completed.
    pub fn is_loaded(&self) -> bool {
        self.state == ModuleState::Loaded
    }

    /// Flags the module for reload if its source stamp moved.
    ///
    /// Returns whether a reload is requested.
    pub fn mark_as_reloading(&mut self, current_stamp: Option<u64>) -> bool {
        if !self.is_loaded() {
            return false;
        }
        if current_stamp != self.stamp {
            self.reload_requested = true;
        }
        self.reload_requested
    }
}

/// Modules by id and by requested alias.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: SlotTable<ScriptModule>,
    by_id: IndexMap<String, ModuleId>,
    aliases: HashMap<String, ModuleId>,
    main: Option<ModuleId>,
}

impl ModuleCache {
    /// Looks a module up by resolved id or alias.
    pub fn find(&self, id: &str) -> Option<ModuleId> {
        self.by_id
            .get(id)
            .or_else(|| self.aliases.get(id))
            .copied()
            .filter(|module_id| self.modules.contains(module_id.0))
    }

    /// Adds a module.
    ///
    /// # Errors
    ///
    /// Fails if a module with the same id is cached.
    pub fn insert(&mut self, module: ScriptModule) -> Result<ModuleId, BridgeError> {
        if self.by_id.contains_key(&module.id) {
            return Err(BridgeError::InvalidObject(format!(
                "module {} is already cached",
                module.id
            )));
        }
        let id = module.id.clone();
        let module_id = ModuleId(self.modules.insert(module));
        self.by_id.insert(id, module_id);
        Ok(module_id)
    }

    /// Records `alias` as another id of `module_id`.
    pub fn add_alias(&mut self, alias: &str, module_id: ModuleId) {
        if !self.by_id.contains_key(alias) {
            self.aliases.insert(alias.to_string(), module_id);
        }
    }

    /// A module by id.
    pub fn get(&self, id: ModuleId) -> Option<&ScriptModule> {
        self.modules.get(id.0)
    }

    /// A module by id.
    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut ScriptModule> {
        self.modules.get_mut(id.0)
    }

    /// Records a parent/child edge. Returns false if either end is stale.
    pub fn link(&mut self, parent: ModuleId, child: ModuleId) -> bool {
        if !self.modules.contains(child.0) {
            return false;
        }
        let Some(parent_module) = self.modules.get_mut(parent.0) else {
            return false;
        };
        if !parent_module.children.contains(&child) {
            parent_module.children.push(child);
        }
        if let Some(child_module) = self.modules.get_mut(child.0) {
            if !child_module.parents.contains(&parent) {
                child_module.parents.push(parent);
            }
        }
        true
    }

    /// Removes a module with its aliases and graph edges.
    pub fn remove(&mut self, id: ModuleId) -> Option<ScriptModule> {
        let module = self.modules.remove(id.0)?;
        if self.main == Some(id) {
            self.main = None;
        }
        self.by_id.shift_remove(&module.id);
        self.aliases.retain(|_, target| *target != id);
        for (_, other) in self.modules.iter_mut() {
            other.children.retain(|child| *child != id);
            other.parents.retain(|parent| *parent != id);
        }
        Some(module)
    }

    /// The first module loaded from the root, while it is cached.
    pub fn main(&self) -> Option<ModuleId> {
        self.main.filter(|id| self.modules.contains(id.0))
    }

    /// Records `id` as the main module unless one is cached already.
    ///
    /// Returns whether `id` became the main module.
    pub fn set_main(&mut self, id: ModuleId) -> bool {
        if self.main().is_some() || !self.modules.contains(id.0) {
            return false;
        }
        self.main = Some(id);
        true
    }

    /// Ids of all modules in insertion order.
    pub fn ids(&self) -> Vec<ModuleId> {
        self.by_id.values().copied().collect()
    }

    /// Removes every module.
    pub fn clear(&mut self) -> Vec<ScriptModule> {
        let ids = self.ids();
        self.main = None;
        self.by_id.clear();
        self.aliases.clear();
        ids.into_iter()
            .filter_map(|id| self.modules.remove(id.0))
            .collect()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
