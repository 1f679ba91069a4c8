//! The composition root.
//!
//! An [`Environment`] owns one engine instance and every registry built on
//! it: bound objects, native and script classes, modules, cached functions,
//! timers, the inbox and the deferred-deletion queue. It is created as an
//! `Rc` so native functions can hold a weak reference back to it, and it is
//! registered in the process-wide [`store`](crate::store) for the lifetime of
//! the value.
//!
//! Teardown happens in two phases. [`Environment::dispose`] releases script
//! state (timers, functions, modules, script classes, the global object)
//! while the token still resolves; dropping the environment then finalizes
//! every object still bound and finally unregisters the token.

mod calls;
mod classes;
mod globals;
mod modules;
mod objects;

use crate::class_registry::ClassRegistry;
use crate::deletion_queue::DeletionQueue;
use crate::function_cache::FunctionCache;
use crate::loaders::{BridgeModuleLoader, HostModuleLoader, BRIDGE_MODULE, HOST_MODULE};
use crate::module_cache::ModuleCache;
use crate::object_registry::ObjectRegistry;
use crate::script_class::{DefaultObject, ScriptClassInfo};
use crate::string_cache::StringCache;
use crate::timers::TimerManager;
use crate::{
    store, BridgeError, BridgeResult, EnvironmentParams, FileSystem, HostObjectModel, Inbox,
    ModuleLoader, ModuleResolver, SearchPathResolver,
};
use core_types::{EnvironmentToken, ErrorKind, HostPointer, SlotTable};
use log::{debug, error};
use script_engine::{Engine, EngineConfig, GcStats, JsValue, Thrown};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Reserved construction tokens.
///
/// A class constructor receiving one of these as its first argument is
/// being constructed by the bridge and must not create a host object.
#[derive(Debug, Clone)]
pub struct Symbols {
    /// Construction for [`Environment::crossbind`]
    pub cross_bind: JsValue,
    /// Construction of a class default object
    pub cdo: JsValue,
}

/// Counters reported by [`Environment::get_statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Bound host objects
    pub live_objects: usize,
    /// Materialized native classes
    pub native_classes: usize,
    /// Registered script classes
    pub script_classes: usize,
    /// Interned names
    pub cached_strings: usize,
    /// Persistent bindings
    pub persistent_objects: usize,
    /// Cached modules
    pub modules: usize,
    /// Cached function references
    pub cached_functions: usize,
    /// Finalizations waiting in the deletion queue
    pub pending_deletions: usize,
    /// Live engine heap objects
    pub heap_objects: usize,
}

/// A script execution context bound to a host object model.
///
/// # Examples
///
/// ```
/// use bridge::{Environment, EnvironmentParams, MemoryFileSystem, NullHost};
/// use core_types::Variant;
/// use std::rc::Rc;
///
/// let fs = Rc::new(MemoryFileSystem::new());
/// fs.write("res/config.json", r#"{"speed": 4}"#);
///
/// let env = Environment::new(
///     EnvironmentParams::default().with_search_path("res"),
///     Rc::new(NullHost),
///     fs,
/// )
/// .unwrap();
/// env.init();
///
/// let module = env.load("config").unwrap();
/// assert_eq!(env.find_module("res/config.json"), Some(module));
/// assert_eq!(
///     env.eval_source("[1, 2]", "inline.json").unwrap(),
///     Variant::Array(vec![Variant::Int(1), Variant::Int(2)])
/// );
/// ```
pub struct Environment {
    self_ref: Weak<Environment>,
    token: EnvironmentToken,
    owner: ThreadId,
    params: EnvironmentParams,
    engine: Engine,
    host: Rc<dyn HostObjectModel>,
    fs: Rc<dyn FileSystem>,
    symbols: Symbols,
    objects: RefCell<ObjectRegistry>,
    classes: RefCell<ClassRegistry>,
    script_classes: RefCell<SlotTable<ScriptClassInfo>>,
    modules: RefCell<ModuleCache>,
    loaders: RefCell<HashMap<String, Rc<dyn ModuleLoader>>>,
    resolvers: RefCell<Vec<Rc<dyn ModuleResolver>>>,
    functions: RefCell<FunctionCache>,
    strings: RefCell<StringCache>,
    pending_delete: RefCell<DeletionQueue>,
    timers: RefCell<TimerManager>,
    inbox: Arc<Inbox>,
    /// Pointers bound on demand while call arguments convert.
    fresh_bindings: RefCell<Option<Vec<HostPointer>>>,
    disposed: Cell<bool>,
}

impl Environment {
    /// Creates an environment owned by the calling thread and registers it
    /// in the store.
    ///
    /// # Errors
    ///
    /// Fails with [`BridgeError::InvalidParams`] if `params` do not validate.
    pub fn new(
        params: EnvironmentParams,
        host: Rc<dyn HostObjectModel>,
        fs: Rc<dyn FileSystem>,
    ) -> BridgeResult<Rc<Self>> {
        params.validate()?;
        let engine = Engine::new(EngineConfig {
            gc_threshold: params.gc_threshold,
            max_call_depth: params.max_call_depth,
        });
        let token = store::next_token();
        engine.set_embedder_token(Some(token));
        let symbols = Symbols {
            cross_bind: engine.new_symbol("CrossBind"),
            cdo: engine.new_symbol("CDO"),
        };

        let mut loaders: HashMap<String, Rc<dyn ModuleLoader>> = HashMap::new();
        loaders.insert(BRIDGE_MODULE.to_string(), Rc::new(BridgeModuleLoader));
        loaders.insert(HOST_MODULE.to_string(), Rc::new(HostModuleLoader));

        let env = Rc::new_cyclic(|weak: &Weak<Environment>| {
            store::register(token, weak.clone());
            Self {
                self_ref: weak.clone(),
                token,
                owner: thread::current().id(),
                objects: RefCell::new(ObjectRegistry::with_capacity(params.initial_object_slots)),
                classes: RefCell::new(ClassRegistry::with_capacity(params.initial_class_slots)),
                script_classes: RefCell::new(SlotTable::with_capacity(params.initial_script_slots)),
                modules: RefCell::new(ModuleCache::default()),
                loaders: RefCell::new(loaders),
                resolvers: RefCell::new(Vec::new()),
                functions: RefCell::new(FunctionCache::default()),
                strings: RefCell::new(StringCache::default()),
                pending_delete: RefCell::new(DeletionQueue::new(params.deletion_queue_size)),
                timers: RefCell::new(TimerManager::default()),
                inbox: Arc::new(Inbox::default()),
                fresh_bindings: RefCell::new(None),
                disposed: Cell::new(false),
                params,
                engine,
                host,
                fs,
                symbols,
            }
        });
        env.install_globals();
        debug!("environment {} created", token);
        Ok(env)
    }

    /// Installs the default resolver over the configured search paths.
    pub fn init(&self) {
        let resolver = SearchPathResolver::new(self.params.search_paths.iter().cloned());
        self.add_module_resolver(Rc::new(resolver));
    }

    /// The engine instance.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The token naming this environment in the store.
    pub fn token(&self) -> EnvironmentToken {
        self.token
    }

    /// Construction parameters.
    pub fn params(&self) -> &EnvironmentParams {
        &self.params
    }

    /// The host object model.
    pub fn host(&self) -> &Rc<dyn HostObjectModel> {
        &self.host
    }

    /// The reserved construction tokens.
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// The inbox; clone it to post from other threads.
    pub fn inbox(&self) -> Arc<Inbox> {
        Arc::clone(&self.inbox)
    }

    /// Whether [`Environment::dispose`] ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn weak(&self) -> Weak<Environment> {
        self.self_ref.clone()
    }

    /// Appends a resolver; resolvers are consulted in registration order.
    pub fn add_module_resolver(&self, resolver: Rc<dyn ModuleResolver>) {
        self.resolvers.borrow_mut().push(resolver);
    }

    /// Registers a built-in module addressed by bare `name`.
    pub fn add_module_loader(&self, name: &str, loader: Rc<dyn ModuleLoader>) {
        self.loaders.borrow_mut().insert(name.to_string(), loader);
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    pub(crate) fn check_thread(&self) -> BridgeResult<()> {
        if thread::current().id() != self.owner {
            return Err(self.violation(BridgeError::WrongThread));
        }
        Ok(())
    }

    pub(crate) fn check_alive(&self) -> BridgeResult<()> {
        self.check_thread()?;
        if self.disposed.get() {
            return Err(BridgeError::Disposed);
        }
        Ok(())
    }

    /// Reports a broken invariant: panics under strict checks, logs otherwise.
    pub(crate) fn violation(&self, err: BridgeError) -> BridgeError {
        if self.params.strict_checks {
            panic!("invariant violation: {}", err);
        }
        error!("invariant violation: {}", err);
        err
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Runs one frame of background work: deferred finalizations, due
    /// timers and inbox messages.
    pub fn update(&self, delta_msecs: u64) {
        if self.disposed.get() || self.check_thread().is_err() {
            return;
        }
        self.exec_sync_delete();
        {
            let _scope = self.engine.open_scope();
            let due = self.timers.borrow_mut().tick(delta_msecs);
            if due {
                self.invoke_timers();
            }
            self.dispatch_messages();
        }
        self.exec_sync_delete();
    }

    /// Drops interned names and runs a full collection.
    pub fn gc(&self) -> GcStats {
        self.strings.borrow_mut().clear();
        let stats = self.engine.collect_garbage();
        self.exec_sync_delete();
        stats
    }

    /// Current counters.
    pub fn get_statistics(&self) -> Statistics {
        let objects = self.objects.borrow();
        Statistics {
            live_objects: objects.len(),
            native_classes: self.classes.borrow().len(),
            script_classes: self.script_classes.borrow().len(),
            cached_strings: self.strings.borrow().len(),
            persistent_objects: objects.persistent_count(),
            modules: self.modules.borrow().len(),
            cached_functions: self.functions.borrow().len(),
            pending_deletions: self.pending_delete.borrow().len(),
            heap_objects: self.engine.live_objects(),
        }
    }

    /// Releases script state while the token still resolves.
    ///
    /// Bound objects survive until the environment is dropped. Calling this
    /// twice has no further effect.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        debug!("disposing environment {}", self.token);

        let timers = self.timers.borrow_mut().clear_all();
        let functions = self.functions.borrow_mut().drain();
        for global in timers.into_iter().chain(functions) {
            self.engine.reset_global(global);
        }

        let modules = self.modules.borrow_mut().clear();
        for module in modules {
            self.engine.reset_global(module.module_object);
            self.engine.reset_global(module.exports);
        }

        let script_classes = std::mem::take(&mut *self.script_classes.borrow_mut());
        for (_, info) in script_classes.iter() {
            self.engine.reset_global(info.constructor);
            if let DefaultObject::Ready(global) = info.default_object {
                self.engine.reset_global(global);
            }
        }

        let constructors = self.classes.borrow().constructor_globals();
        for global in constructors {
            self.engine.reset_global(global);
        }

        self.engine.clear_own_properties(self.engine.global());
        self.exec_sync_delete();
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.dispose();
        loop {
            let next = self.objects.borrow().first_pointer();
            let Some(pointer) = next else {
                break;
            };
            if let Err(err) = self.free_object(pointer, true) {
                error!("failed to free {} during teardown: {}", pointer, err);
                break;
            }
        }
        self.exec_sync_delete();
        store::unregister(self.token);
        debug!("environment {} destroyed", self.token);
    }
}

/// Upgrades the weak environment reference held by a native function.
pub(crate) fn environment_of(engine: &Engine, weak: &Weak<Environment>) -> Result<Rc<Environment>, Thrown> {
    weak.upgrade()
        .ok_or_else(|| engine.throw_error(ErrorKind::InternalError, "environment disposed"))
}
