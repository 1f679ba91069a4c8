//! Module loading, reloading and evaluation.

use super::{environment_of, Environment};
use crate::loaders::ModuleLoader;
use crate::marshal;
use crate::module_cache::{ModuleState, ReloadResult, ScriptModule};
use crate::path_util;
use crate::{BridgeError, BridgeResult, ModuleResolver};
use core_types::{ErrorKind, ModuleId, ScriptError, Variant};
use log::{debug, error, trace, warn};
use script_engine::{JsValue, ObjectRef, Thrown, TryCatch};
use std::rc::Rc;

impl Environment {
    /// Loads (or returns the cached) module `module_id` from the root.
    ///
    /// Script exceptions raised by the module body are logged and returned
    /// as [`BridgeError::Exception`]; a module that failed is not cached.
    pub fn load(&self, module_id: &str) -> BridgeResult<ModuleId> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let _try_catch = TryCatch::new(&self.engine);
        let loaded = self.load_module(None, module_id);
        if let Err(err) = &loaded {
            match err {
                BridgeError::Exception(report) => {
                    error!("failed to load {}: {}\n{}", module_id, report, report.stack_trace())
                }
                _ => error!("failed to load {}: {}", module_id, err),
            }
        }
        loaded
    }

    /// A cached module by resolved id, path or alias.
    pub fn find_module(&self, module_id: &str) -> Option<ModuleId> {
        self.modules.borrow().find(module_id)
    }

    /// A snapshot of a cached module.
    pub fn module(&self, module_id: ModuleId) -> Option<ScriptModule> {
        self.modules.borrow().get(module_id).cloned()
    }

    /// The current `module.exports` of a cached module.
    pub fn module_exports(&self, module_id: ModuleId) -> Option<JsValue> {
        let global = self.modules.borrow().get(module_id)?.exports;
        self.engine.global_value(global)
    }

    pub(crate) fn load_module(&self, parent: Option<ModuleId>, module_id: &str) -> BridgeResult<ModuleId> {
        let relative = path_util::is_relative(module_id);
        if !relative {
            if let Some(cached) = self.find_module(module_id) {
                return self.use_cached(parent, cached);
            }
            let loader = self.loaders.borrow().get(module_id).cloned();
            if let Some(loader) = loader {
                return self.load_builtin(parent, module_id, loader);
            }
        }

        let resolved = if relative {
            let parent_path = parent
                .and_then(|id| self.modules.borrow().get(id).and_then(|m| m.path.clone()))
                .unwrap_or_default();
            path_util::normalize(&path_util::combine(path_util::dirname(&parent_path), module_id))
        } else {
            path_util::normalize(module_id)
        };
        let resolved = resolved.ok_or_else(|| BridgeError::BadPath(module_id.to_string()))?;
        if let Some(cached) = self.find_module(&resolved) {
            return self.use_cached(parent, cached);
        }

        let resolvers: Vec<Rc<dyn ModuleResolver>> = self.resolvers.borrow().clone();
        let found = resolvers
            .iter()
            .enumerate()
            .find_map(|(index, resolver)| Some((index, resolver.resolve(self.fs.as_ref(), &resolved)?)));
        let Some((index, path)) = found else {
            return Err(BridgeError::UnknownModule(module_id.to_string()));
        };
        if let Some(cached) = self.find_module(&path) {
            self.modules.borrow_mut().add_alias(&resolved, cached);
            return self.use_cached(parent, cached);
        }

        let source = resolvers[index].read_source(self.fs.as_ref(), &path)?;
        self.instantiate_module(parent, &resolved, &path, index, &source)
    }

    fn use_cached(&self, parent: Option<ModuleId>, module_id: ModuleId) -> BridgeResult<ModuleId> {
        let reload = self
            .modules
            .borrow()
            .get(module_id)
            .is_some_and(|module| module.reload_requested);
        if reload {
            self.reload_module(module_id)?;
        }
        self.link_parent(parent, module_id);
        Ok(module_id)
    }

    fn new_module_object(&self, id: &str, filename: &str, exports: ObjectRef) -> ObjectRef {
        let module = self.engine.new_object();
        self.engine.define(module, "id", JsValue::string(id));
        self.engine.define(module, "filename", JsValue::string(filename));
        self.engine.define(module, "loaded", JsValue::Boolean(false));
        self.engine.define(module, "exports", JsValue::Object(exports));
        let children = self.engine.new_array(Vec::new());
        self.engine.define(module, "children", JsValue::Object(children));
        module
    }

    fn load_builtin(
        &self,
        parent: Option<ModuleId>,
        name: &str,
        loader: Rc<dyn ModuleLoader>,
    ) -> BridgeResult<ModuleId> {
        let exports = self.engine.new_object();
        let module_object = self.new_module_object(name, name, exports);
        let module = ScriptModule::new(
            name,
            None,
            self.engine.new_global(JsValue::Object(module_object)),
            self.engine.new_global(JsValue::Object(exports)),
        );
        let module_id = self.insert_module(module)?;

        if loader.load(self, exports).is_err() {
            let report = self.capture_exception();
            self.discard_module(module_id);
            return Err(report.map_or_else(|| BridgeError::UnknownModule(name.to_string()), BridgeError::Exception));
        }
        self.finish_loading(module_id, module_object);
        self.link_parent(parent, module_id);
        debug!("built-in module {} loaded", name);
        Ok(module_id)
    }

    fn instantiate_module(
        &self,
        parent: Option<ModuleId>,
        resolved: &str,
        path: &str,
        resolver: usize,
        source: &str,
    ) -> BridgeResult<ModuleId> {
        let exports = self.engine.new_object();
        let module_object = self.new_module_object(path, path, exports);
        let mut module = ScriptModule::new(
            path,
            Some(path.to_string()),
            self.engine.new_global(JsValue::Object(module_object)),
            self.engine.new_global(JsValue::Object(exports)),
        );
        module.resolver = Some(resolver);
        module.stamp = self.fs.modified(path);
        let module_id = self.insert_module(module)?;
        self.modules.borrow_mut().add_alias(resolved, module_id);
        self.link_parent(parent, module_id);
        if parent.is_none() && self.modules.borrow_mut().set_main(module_id) {
            debug!("main module is {}", path);
            self.publish_main_module();
        }
        debug!("instantiating module {} from {}", resolved, path);

        if let Err(err) = self.execute_module(module_id, path, source) {
            self.discard_module(module_id);
            return Err(err);
        }
        self.finish_loading(module_id, module_object);
        self.parse_script_class(module_id);
        Ok(module_id)
    }

    fn insert_module(&self, module: ScriptModule) -> BridgeResult<ModuleId> {
        let (module_object, exports) = (module.module_object, module.exports);
        let inserted = self.modules.borrow_mut().insert(module);
        if inserted.is_err() {
            self.engine.reset_global(module_object);
            self.engine.reset_global(exports);
        }
        inserted
    }

    fn finish_loading(&self, module_id: ModuleId, module_object: ObjectRef) {
        if let Some(module) = self.modules.borrow_mut().get_mut(module_id) {
            module.state = ModuleState::Loaded;
        }
        self.engine.define(module_object, "loaded", JsValue::Boolean(true));
    }

    /// Drops a module whose body failed, unlinking it from its parents.
    fn discard_module(&self, module_id: ModuleId) {
        let was_main = self.modules.borrow().main() == Some(module_id);
        let module = self.modules.borrow_mut().remove(module_id);
        let Some(module) = module else {
            return;
        };
        if was_main {
            self.publish_main_module();
        }
        let child = self.engine.global_value(module.module_object).unwrap_or_default();
        for parent in &module.parents {
            if let Some(children) = self.module_children(*parent) {
                self.engine.array_remove(children, &child);
            }
        }
        self.engine.reset_global(module.module_object);
        self.engine.reset_global(module.exports);
        warn!("module {} failed to load and was discarded", module.id);
    }

    fn module_children(&self, module_id: ModuleId) -> Option<ObjectRef> {
        let global = self.modules.borrow().get(module_id)?.module_object;
        let module_object = self.engine.global_value(global)?.as_object()?;
        self.engine.data_property(module_object, "children")?.as_object()
    }

    fn link_parent(&self, parent: Option<ModuleId>, child: ModuleId) {
        let Some(parent) = parent else {
            return;
        };
        let linked = {
            let mut modules = self.modules.borrow_mut();
            let known = modules
                .get(parent)
                .map(|module| module.children.contains(&child));
            match known {
                Some(true) => return,
                Some(false) => modules.link(parent, child),
                None => false,
            }
        };
        if !linked {
            warn!("parent module {} of {} is missing", parent, child);
            return;
        }
        let child_object = self
            .modules
            .borrow()
            .get(child)
            .and_then(|module| self.engine.global_value(module.module_object));
        if let (Some(children), Some(child_object)) = (self.module_children(parent), child_object) {
            self.engine.array_push(children, child_object);
        }
    }

    /// Runs a module body with the CommonJS wrapper arguments, then
    /// refreshes the cached exports from `module.exports`.
    fn execute_module(&self, module_id: ModuleId, path: &str, source: &str) -> BridgeResult<()> {
        let (module_global, exports_global) = {
            let modules = self.modules.borrow();
            let module = modules
                .get(module_id)
                .ok_or_else(|| BridgeError::UnknownModule(path.to_string()))?;
            (module.module_object, module.exports)
        };
        let module_object = self.engine.global_value(module_global).unwrap_or_default();
        let exports = self.engine.global_value(exports_global).unwrap_or_default();

        let function = match self.engine.compile(path, source) {
            Ok(function) => function,
            Err(_) => {
                return Err(self
                    .capture_exception()
                    .map_or_else(|| BridgeError::CompilationFailed(path.to_string()), BridgeError::Exception))
            }
        };
        let require = self.new_require_function(Some(module_id));
        let args = [
            exports.clone(),
            JsValue::Object(require),
            module_object.clone(),
            JsValue::string(path),
            JsValue::string(path_util::dirname(path)),
        ];
        if self.engine.call(&function, exports, &args).is_err() {
            return Err(self
                .capture_exception()
                .map_or_else(|| BridgeError::CompilationFailed(path.to_string()), BridgeError::Exception));
        }

        let current = module_object
            .as_object()
            .and_then(|module| self.engine.data_property(module, "exports"))
            .unwrap_or_default();
        let refreshed = self.engine.new_global(current);
        let previous = {
            let mut modules = self.modules.borrow_mut();
            modules.get_mut(module_id).map(|module| std::mem::replace(&mut module.exports, refreshed))
        };
        self.engine.reset_global(previous.unwrap_or(refreshed));
        Ok(())
    }

    /// Takes the pending exception as a report.
    ///
    /// Inside script frames the exception is thrown again so it reaches the
    /// calling script unchanged.
    fn capture_exception(&self) -> Option<ScriptError> {
        let value = self.engine.take_exception()?;
        let report = self.engine.error_report(&value);
        if self.engine.call_depth() > 0 {
            self.engine.throw(value);
        }
        Some(report)
    }

    /// The `module` object of the main module.
    pub fn main_module(&self) -> Option<JsValue> {
        let global = {
            let modules = self.modules.borrow();
            modules.get(modules.main()?)?.module_object
        };
        self.engine.global_value(global)
    }

    /// Points the global `require.main` at the current main module.
    fn publish_main_module(&self) {
        let require = self.engine.data_property(self.engine.global(), "require");
        if let Some(require) = require.and_then(|require| require.as_object()) {
            self.engine
                .define(require, "main", self.main_module().unwrap_or_default());
        }
    }

    /// A `require` function resolving relative ids against `parent`, with
    /// `require.main` set to the main module.
    pub(crate) fn new_require_function(&self, parent: Option<ModuleId>) -> ObjectRef {
        let weak = self.weak();
        let require = self.engine.new_function("require", move |engine, call| {
            let env = environment_of(engine, &weak)?;
            let Some(id) = call.arg(0).as_str().map(str::to_string) else {
                return Err(engine.throw_error(ErrorKind::TypeError, "module id must be a string"));
            };
            match env.load_module(parent, &id) {
                Ok(module_id) => Ok(env.module_exports(module_id).unwrap_or_default()),
                Err(_) if engine.has_pending_exception() => Err(Thrown),
                Err(err) => Err(engine.throw_error(
                    ErrorKind::Error,
                    &format!("Cannot require '{}': {}", id, err),
                )),
            }
        });
        let main = self.main_module();
        if main.is_none() && parent.is_some() {
            warn!("invalid main module");
        }
        self.engine.define(require, "main", main.unwrap_or_default());
        require
    }

    /// Re-executes a module in place: same id, same module object, and the
    /// same exports object unless the body replaces `module.exports`.
    ///
    /// A failed reload leaves the previous state loaded.
    pub fn reload_module(&self, module_id: ModuleId) -> BridgeResult<()> {
        self.check_alive()?;
        let (path, resolver) = {
            let mut modules = self.modules.borrow_mut();
            let module = modules
                .get_mut(module_id)
                .ok_or_else(|| BridgeError::UnknownModule(module_id.to_string()))?;
            module.reload_requested = false;
            (module.path.clone(), module.resolver)
        };
        let (Some(path), Some(resolver)) = (path, resolver) else {
            return Ok(());
        };
        let resolver = self
            .resolvers
            .borrow()
            .get(resolver)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownModule(path.clone()))?;
        let source = resolver.read_source(self.fs.as_ref(), &path)?;
        let stamp = self.fs.modified(&path);

        let _scope = self.engine.open_scope();
        debug!("reloading module {}", path);
        if let Err(err) = self.execute_module(module_id, &path, &source) {
            error!("failed to reload {}: {}", path, err);
            return Err(err);
        }
        if let Some(module) = self.modules.borrow_mut().get_mut(module_id) {
            module.stamp = stamp;
        }
        self.parse_script_class(module_id);
        Ok(())
    }

    /// Requests a reload of a module whose source changed.
    pub fn mark_as_reloading(&self, module_id: &str) -> ReloadResult {
        let Some(id) = self.find_module(module_id) else {
            return ReloadResult::NoSuchModule;
        };
        // A module still loading picks up its current source anyway.
        if self.modules.borrow().get(id).is_some_and(|module| !module.is_loaded()) {
            return ReloadResult::Requested;
        }
        let path = self.modules.borrow().get(id).and_then(|module| module.path.clone());
        let stamp = path.and_then(|path| self.fs.modified(&path));
        let requested = self
            .modules
            .borrow_mut()
            .get_mut(id)
            .is_some_and(|module| module.mark_as_reloading(stamp));
        if requested {
            trace!("module {} marked for reload", module_id);
            ReloadResult::Requested
        } else {
            ReloadResult::NoChanges
        }
    }

    /// Reloads every file module whose source stamp moved.
    ///
    /// Modules defining a script class are skipped. Returns the reloaded
    /// modules.
    pub fn scan_external_changes(&self) -> Vec<ModuleId> {
        if self.check_alive().is_err() {
            return Vec::new();
        }
        let candidates: Vec<(ModuleId, String)> = {
            let modules = self.modules.borrow();
            modules
                .ids()
                .into_iter()
                .filter_map(|id| {
                    let module = modules.get(id)?;
                    if module.script_class.is_some() {
                        return None;
                    }
                    Some((id, module.path.clone()?))
                })
                .collect()
        };
        let flagged: Vec<ModuleId> = candidates
            .into_iter()
            .filter(|(id, path)| {
                let stamp = self.fs.modified(path);
                self.modules
                    .borrow_mut()
                    .get_mut(*id)
                    .is_some_and(|module| module.mark_as_reloading(stamp))
            })
            .map(|(id, _)| id)
            .collect();

        let _try_catch = TryCatch::new(&self.engine);
        flagged
            .into_iter()
            .filter(|id| self.reload_module(*id).is_ok())
            .collect()
    }

    /// Compiles and evaluates one snippet, returning its converted value.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::CompilationFailed`] if the source does not compile
    /// * [`BridgeError::Exception`] if evaluation throws
    /// * [`BridgeError::Conversion`] if the result has no host form
    pub fn eval_source(&self, source: &str, filename: &str) -> BridgeResult<Variant> {
        self.check_alive()?;
        let _scope = self.engine.open_scope();
        let try_catch = TryCatch::new(&self.engine);
        let function = self.engine.compile(filename, source).map_err(|_| {
            let message = try_catch
                .exception()
                .map(|err| err.to_string())
                .unwrap_or_else(|| filename.to_string());
            BridgeError::CompilationFailed(message)
        })?;
        let value = match self.engine.call(&function, JsValue::Undefined, &[]) {
            Ok(value) => value,
            Err(_) => {
                let report = try_catch
                    .exception()
                    .unwrap_or_else(|| ScriptError::new(ErrorKind::Error, "unknown exception"));
                error!("{}: {}", filename, report);
                return Err(BridgeError::Exception(report));
            }
        };
        Ok(marshal::to_variant(self, &value)?)
    }
}
