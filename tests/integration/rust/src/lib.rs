//! Integration test support for the embedding bridge
//!
//! Provides a [`MockHost`] object model, a [`ScriptedCompiler`] whose module
//! bodies are Rust closures, and a [`Harness`] wiring both into an
//! environment over an in-memory file system.

use bridge::{
    BindingPolicy, Environment, EnvironmentParams, HostCallError, HostClassInfo, HostObjectModel,
    MemoryFileSystem,
};
use core_types::{ErrorKind, HostPointer, Variant};
use script_engine::{Engine, JsValue, JsonCompiler, ObjectRef, SourceCompiler, Thrown};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Re-export components for test convenience
pub mod components {
    pub use bridge;
    pub use bridge_cli;
    pub use core_types;
    pub use script_engine;
}

/// Initializes test logging once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Host
// ============================================================================

struct MockObject {
    class: String,
    hp: i64,
    dying: bool,
}

/// Host model with two classes.
///
/// `Actor` has an `hp` property and a `hit(amount)` method returning the
/// remaining hp. `Resource` is reference counted; a resource spawned with
/// [`MockHost::spawn_dying`] refuses its initial reference.
#[derive(Default)]
pub struct MockHost {
    objects: RefCell<HashMap<HostPointer, MockObject>>,
    next_address: Cell<usize>,
    finalized: RefCell<Vec<(HostPointer, bool)>>,
    refs: RefCell<HashMap<HostPointer, i32>>,
    refusing: Cell<bool>,
}

impl MockHost {
    /// Creates a host object of `class`.
    pub fn spawn(&self, class: &str) -> HostPointer {
        self.insert(class, false)
    }

    /// Creates a ref-counted object that is already being destroyed.
    pub fn spawn_dying(&self, class: &str) -> HostPointer {
        self.insert(class, true)
    }

    fn insert(&self, class: &str, dying: bool) -> HostPointer {
        let index = self.next_address.get() + 1;
        self.next_address.set(index);
        let pointer = HostPointer::new(0x10_0000 + index * 0x40).expect("non-null address");
        self.objects.borrow_mut().insert(
            pointer,
            MockObject {
                class: class.to_string(),
                hp: 10,
                dying,
            },
        );
        pointer
    }

    /// Whether the object was not finalized yet.
    pub fn is_alive(&self, pointer: HostPointer) -> bool {
        self.objects.borrow().contains_key(&pointer)
    }

    /// Finalized objects with their persistence flag, in order.
    pub fn finalized(&self) -> Vec<(HostPointer, bool)> {
        self.finalized.borrow().clone()
    }

    /// Makes every ref-counted object refuse its initial reference.
    pub fn refuse_refs(&self, refuse: bool) {
        self.refusing.set(refuse);
    }

    /// Initial references taken and not released.
    pub fn host_refs(&self, pointer: HostPointer) -> i32 {
        self.refs.borrow().get(&pointer).copied().unwrap_or(0)
    }

    /// The `hp` of an actor.
    pub fn hp(&self, pointer: HostPointer) -> Option<i64> {
        self.objects.borrow().get(&pointer).map(|obj| obj.hp)
    }
}

impl HostObjectModel for MockHost {
    fn class_info(&self, class_name: &str) -> Option<HostClassInfo> {
        match class_name {
            "Actor" => Some(
                HostClassInfo::new("Actor", None)
                    .with_property("hp")
                    .with_method("hit"),
            ),
            "Resource" => Some(HostClassInfo::new("Resource", None)),
            _ => None,
        }
    }

    fn class_of(&self, pointer: HostPointer) -> Option<String> {
        self.objects.borrow().get(&pointer).map(|obj| obj.class.clone())
    }

    fn instantiate(&self, class_name: &str) -> Option<HostPointer> {
        self.class_info(class_name)?;
        Some(self.spawn(class_name))
    }

    fn is_ref_counted(&self, pointer: HostPointer) -> bool {
        self.class_of(pointer).as_deref() == Some("Resource")
    }

    fn init_ref(&self, pointer: HostPointer) -> bool {
        let alive = self
            .objects
            .borrow()
            .get(&pointer)
            .is_some_and(|obj| !obj.dying)
            && !self.refusing.get();
        if alive {
            *self.refs.borrow_mut().entry(pointer).or_insert(0) += 1;
        }
        alive
    }

    fn release_ref(&self, pointer: HostPointer) {
        *self.refs.borrow_mut().entry(pointer).or_insert(0) -= 1;
    }

    fn call_method(
        &self,
        pointer: HostPointer,
        method: &str,
        args: &[Variant],
    ) -> Result<Variant, HostCallError> {
        let mut objects = self.objects.borrow_mut();
        let obj = objects
            .get_mut(&pointer)
            .ok_or(HostCallError::DeadObject(pointer))?;
        match (method, args.first()) {
            ("hit", Some(Variant::Int(amount))) => {
                obj.hp -= amount;
                Ok(Variant::Int(obj.hp))
            }
            ("hit", _) => Err(HostCallError::InvalidArgument {
                index: 0,
                reason: "expected an integer".to_string(),
            }),
            _ => Err(HostCallError::UnknownMethod(method.to_string())),
        }
    }

    fn get_property(&self, pointer: HostPointer, name: &str) -> Result<Variant, HostCallError> {
        let objects = self.objects.borrow();
        let obj = objects.get(&pointer).ok_or(HostCallError::DeadObject(pointer))?;
        match name {
            "hp" => Ok(Variant::Int(obj.hp)),
            _ => Err(HostCallError::UnknownProperty(name.to_string())),
        }
    }

    fn set_property(
        &self,
        pointer: HostPointer,
        name: &str,
        value: Variant,
    ) -> Result<(), HostCallError> {
        let mut objects = self.objects.borrow_mut();
        let obj = objects
            .get_mut(&pointer)
            .ok_or(HostCallError::DeadObject(pointer))?;
        match (name, value) {
            ("hp", Variant::Int(hp)) => {
                obj.hp = hp;
                Ok(())
            }
            ("hp", other) => Err(HostCallError::Failed(format!("hp must be an integer, got {}", other.kind().name()))),
            _ => Err(HostCallError::UnknownProperty(name.to_string())),
        }
    }

    fn finalize(&self, pointer: HostPointer, persistent: bool) {
        self.objects.borrow_mut().remove(&pointer);
        self.finalized.borrow_mut().push((pointer, persistent));
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// The CommonJS arguments a module body receives.
pub struct ModuleScope {
    /// `exports`
    pub exports: JsValue,
    /// The module's `require`
    pub require: JsValue,
    /// `module`
    pub module: JsValue,
}

impl ModuleScope {
    /// Calls `require(id)`.
    pub fn require(&self, engine: &Engine, id: &str) -> Result<JsValue, Thrown> {
        engine.call(&self.require, JsValue::Undefined, &[JsValue::from(id)])
    }

    /// Sets `exports[key]`.
    pub fn export(&self, engine: &Engine, key: &str, value: JsValue) -> Result<(), Thrown> {
        engine.set_value(&self.exports, key, value)
    }
}

type ModuleBody = Rc<dyn Fn(&Engine, &ModuleScope) -> Result<(), Thrown>>;

/// Compiles sources by name: the trimmed file content selects a registered
/// body. `.json` files compile as data.
#[derive(Clone, Default)]
pub struct ScriptedCompiler {
    scripts: Rc<RefCell<HashMap<String, ModuleBody>>>,
}

impl ScriptedCompiler {
    /// Registers the body run by files whose content is `name`.
    pub fn script<F>(&self, name: &str, body: F)
    where
        F: Fn(&Engine, &ModuleScope) -> Result<(), Thrown> + 'static,
    {
        self.scripts.borrow_mut().insert(name.to_string(), Rc::new(body));
    }
}

impl SourceCompiler for ScriptedCompiler {
    fn compile(&self, engine: &Engine, filename: &str, source: &str) -> Result<JsValue, Thrown> {
        if filename.ends_with(".json") {
            return JsonCompiler.compile(engine, filename, source);
        }
        let body = self.scripts.borrow().get(source.trim()).cloned();
        let Some(body) = body else {
            return Err(engine.throw_error(
                ErrorKind::SyntaxError,
                &format!("{}: unknown script '{}'", filename, source.trim()),
            ));
        };
        let function = engine.new_function(filename, move |engine, call| {
            let scope = ModuleScope {
                exports: call.arg(0),
                require: call.arg(1),
                module: call.arg(2),
            };
            body(engine, &scope)?;
            Ok(JsValue::Undefined)
        });
        engine.set_function_source(function, filename);
        Ok(JsValue::Object(function))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An initialized environment over [`MockHost`] and a memory file system
/// rooted at `res`.
pub struct Harness {
    /// The environment
    pub env: Rc<Environment>,
    /// The host model
    pub host: Rc<MockHost>,
    /// Module sources
    pub fs: Rc<MemoryFileSystem>,
    /// Module bodies
    pub compiler: ScriptedCompiler,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Default parameters with the `res` search path.
    pub fn new() -> Self {
        Self::with_params(EnvironmentParams::default().with_search_path("res"))
    }

    /// Custom parameters.
    pub fn with_params(params: EnvironmentParams) -> Self {
        init_logging();
        let host = Rc::new(MockHost::default());
        let fs = Rc::new(MemoryFileSystem::new());
        let env = Environment::new(params, host.clone(), fs.clone()).expect("valid parameters");
        env.init();
        let compiler = ScriptedCompiler::default();
        env.engine().set_compiler(Rc::new(compiler.clone()));
        Self {
            env,
            host,
            fs,
            compiler,
        }
    }

    /// The engine.
    pub fn engine(&self) -> &Engine {
        self.env.engine()
    }

    /// Spawns a host object and binds a fresh wrapper to it.
    pub fn bind(&self, class: &str, policy: BindingPolicy) -> (HostPointer, ObjectRef) {
        let class_id = self.env.expose_host_class(class).expect("host class");
        let pointer = self.host.spawn(class);
        let prototype = self
            .env
            .class_constructor(class_id)
            .and_then(|ctor| self.engine().data_property(ctor, "prototype"))
            .and_then(|proto| proto.as_object());
        let obj = self.engine().new_wrapper(prototype);
        self.env
            .bind_pointer(class_id, pointer, obj, policy)
            .expect("fresh binding");
        (pointer, obj)
    }

    /// Writes a script file whose body is registered under `script`.
    pub fn add_script<F>(&self, path: &str, script: &str, body: F)
    where
        F: Fn(&Engine, &ModuleScope) -> Result<(), Thrown> + 'static,
    {
        self.compiler.script(script, body);
        self.fs.write(path, script);
    }

    /// Exports of a cached module as an object.
    pub fn exports(&self, module: &str) -> ObjectRef {
        let id = self.env.find_module(module).expect("cached module");
        self.env
            .module_exports(id)
            .and_then(|exports| exports.as_object())
            .expect("object exports")
    }
}
