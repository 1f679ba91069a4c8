//! The engine instance.
//!
//! An [`Engine`] owns one heap, one global object and the handle and global
//! tables that root values from the host. All methods take `&self`; state is
//! kept in cells so native functions can call back into the engine freely.
//! No internal borrow is held while native code runs.

use crate::handle::{GlobalTable, HandleStack, WeakCallback};
use crate::heap::{FunctionData, FunctionKind, Heap, HeapObject, ObjectKind};
use crate::{
    GlobalId, HandleScope, InternalField, JsValue, JsonCompiler, ObjectRef, SourceCompiler,
    SymbolId, Thrown,
};
use core_types::{EnvironmentToken, ErrorKind, HostPointer, ScriptError, StackFrame};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Allocations since the last collection that trigger a collection when
    /// the outermost handle scope closes. `0` disables automatic collection.
    pub gc_threshold: usize,
    /// Maximum native call depth before a `RangeError` is thrown.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 10_000,
            max_call_depth: 256,
        }
    }
}

/// Arguments of a native function invocation.
pub struct CallInfo {
    /// The receiver
    pub this: JsValue,
    /// Positional arguments
    pub args: Vec<JsValue>,
    /// Data attached to the function when it was created
    pub data: JsValue,
    /// The function being invoked
    pub callee: ObjectRef,
    /// The constructor `new` was applied to, for construct calls
    pub new_target: Option<ObjectRef>,
}

impl CallInfo {
    /// Argument at `index`, or `undefined` when absent.
    pub fn arg(&self, index: usize) -> JsValue {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Whether this invocation came from `construct`.
    pub fn is_construct_call(&self) -> bool {
        self.new_target.is_some()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Intrinsics {
    pub(crate) global: ObjectRef,
    pub(crate) object_prototype: ObjectRef,
    pub(crate) function_prototype: ObjectRef,
    pub(crate) array_prototype: ObjectRef,
    pub(crate) error_prototype: ObjectRef,
    pub(crate) promise_prototype: ObjectRef,
}

impl Intrinsics {
    pub(crate) fn roots(&self) -> [ObjectRef; 6] {
        [
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.error_prototype,
            self.promise_prototype,
        ]
    }
}

/// A script engine instance.
///
/// # Examples
///
/// ```
/// use script_engine::{Engine, JsValue};
///
/// let engine = Engine::default();
/// let add = engine.new_function("add", |_, info| {
///     let a = info.arg(0).as_number().unwrap_or(0.0);
///     let b = info.arg(1).as_number().unwrap_or(0.0);
///     Ok(JsValue::from(a + b))
/// });
///
/// let sum = engine
///     .call(&add.into(), JsValue::Undefined, &[1.0.into(), 2.0.into()])
///     .unwrap();
/// assert_eq!(sum, JsValue::Number(3.0));
/// ```
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) heap: RefCell<Heap>,
    pub(crate) handles: RefCell<HandleStack>,
    pub(crate) globals: RefCell<GlobalTable>,
    pub(crate) intrinsics: Intrinsics,
    exception: RefCell<Option<JsValue>>,
    frames: RefCell<Vec<StackFrame>>,
    symbols: RefCell<Vec<Rc<str>>>,
    compiler: RefCell<Rc<dyn SourceCompiler>>,
    embedder_token: Cell<Option<EnvironmentToken>>,
    pub(crate) open_scopes: Cell<usize>,
    pub(crate) collecting: Cell<bool>,
    pub(crate) gc_count: Cell<u64>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Creates an engine with a fresh heap and global object.
    pub fn new(config: EngineConfig) -> Self {
        let mut heap = Heap::default();
        let object_prototype = heap.alloc(HeapObject::new(ObjectKind::Ordinary, None));
        let mut derived = || heap.alloc(HeapObject::new(ObjectKind::Ordinary, Some(object_prototype)));
        let intrinsics = Intrinsics {
            function_prototype: derived(),
            array_prototype: derived(),
            error_prototype: derived(),
            promise_prototype: derived(),
            global: derived(),
            object_prototype,
        };

        let engine = Self {
            config,
            heap: RefCell::new(heap),
            handles: RefCell::new(HandleStack::default()),
            globals: RefCell::new(GlobalTable::default()),
            intrinsics,
            exception: RefCell::new(None),
            frames: RefCell::new(Vec::new()),
            symbols: RefCell::new(Vec::new()),
            compiler: RefCell::new(Rc::new(JsonCompiler)),
            embedder_token: Cell::new(None),
            open_scopes: Cell::new(0),
            collecting: Cell::new(false),
            gc_count: Cell::new(0),
        };
        engine.define(intrinsics.error_prototype, "name", JsValue::from("Error"));
        engine.define(intrinsics.error_prototype, "message", JsValue::from(""));
        engine.define(intrinsics.global, "globalThis", JsValue::Object(intrinsics.global));
        engine
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The global object.
    pub fn global(&self) -> ObjectRef {
        self.intrinsics.global
    }

    /// `Object.prototype`.
    pub fn object_prototype(&self) -> ObjectRef {
        self.intrinsics.object_prototype
    }

    /// Associates an embedder token with this engine.
    pub fn set_embedder_token(&self, token: Option<EnvironmentToken>) {
        self.embedder_token.set(token);
    }

    /// The token set by the embedder, if any.
    pub fn embedder_token(&self) -> Option<EnvironmentToken> {
        self.embedder_token.get()
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Replaces the source compiler.
    pub fn set_compiler(&self, compiler: Rc<dyn SourceCompiler>) {
        *self.compiler.borrow_mut() = compiler;
    }

    /// Compiles `source` into a function value using the installed compiler.
    pub fn compile(&self, filename: &str, source: &str) -> Result<JsValue, Thrown> {
        let compiler = self.compiler.borrow().clone();
        compiler.compile(self, filename, source)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    pub(crate) fn alloc(&self, object: HeapObject) -> ObjectRef {
        self.heap.borrow_mut().alloc(object)
    }

    /// Creates an empty ordinary object.
    pub fn new_object(&self) -> ObjectRef {
        self.new_object_with_proto(Some(self.intrinsics.object_prototype))
    }

    /// Creates an empty object with the given prototype.
    pub fn new_object_with_proto(&self, prototype: Option<ObjectRef>) -> ObjectRef {
        self.alloc(HeapObject::new(ObjectKind::Ordinary, prototype))
    }

    /// Creates an object with an empty internal field.
    pub fn new_wrapper(&self, prototype: Option<ObjectRef>) -> ObjectRef {
        let mut object = HeapObject::new(ObjectKind::Ordinary, prototype);
        object.internal = InternalField::Unset;
        self.alloc(object)
    }

    /// Creates an array holding `items`.
    pub fn new_array(&self, items: Vec<JsValue>) -> ObjectRef {
        self.alloc(HeapObject::new(
            ObjectKind::Array(items),
            Some(self.intrinsics.array_prototype),
        ))
    }

    /// Creates a native function.
    pub fn new_function<F>(&self, name: &str, behavior: F) -> ObjectRef
    where
        F: Fn(&Engine, &CallInfo) -> Result<JsValue, Thrown> + 'static,
    {
        self.new_function_with_data(name, JsValue::Undefined, behavior)
    }

    /// Creates a native function carrying `data`, passed back in [`CallInfo::data`].
    pub fn new_function_with_data<F>(&self, name: &str, data: JsValue, behavior: F) -> ObjectRef
    where
        F: Fn(&Engine, &CallInfo) -> Result<JsValue, Thrown> + 'static,
    {
        self.alloc(HeapObject::new(
            ObjectKind::Function(FunctionData {
                name: Rc::from(name),
                behavior: Rc::new(behavior),
                data,
                kind: FunctionKind::Plain,
                source_url: None,
            }),
            Some(self.intrinsics.function_prototype),
        ))
    }

    /// Creates a class constructor.
    ///
    /// The constructor's `prototype` inherits from `parent.prototype`. When
    /// constructed, every constructor in the chain runs base first against
    /// the same instance. Instances carry an internal field when
    /// `instance_fields` is set on this class or any ancestor.
    ///
    /// # Errors
    ///
    /// Throws a `TypeError` if `parent` is not a class constructor.
    pub fn new_class<F>(
        &self,
        name: &str,
        parent: Option<ObjectRef>,
        instance_fields: bool,
        behavior: F,
    ) -> Result<ObjectRef, Thrown>
    where
        F: Fn(&Engine, &CallInfo) -> Result<JsValue, Thrown> + 'static,
    {
        let (parent_prototype, inherited) = match parent {
            Some(parent) => {
                let Some(inherited) = self.constructor_fields(parent) else {
                    let shown = self.display_string(&JsValue::Object(parent));
                    return Err(self.throw_error(
                        ErrorKind::TypeError,
                        &format!("Class extends value {} is not a constructor", shown),
                    ));
                };
                (self.get(parent, "prototype")?.as_object(), inherited)
            }
            None => (Some(self.intrinsics.object_prototype), false),
        };

        let constructor = self.alloc(HeapObject::new(
            ObjectKind::Function(FunctionData {
                name: Rc::from(name),
                behavior: Rc::new(behavior),
                data: JsValue::Undefined,
                kind: FunctionKind::Constructor {
                    instance_fields: instance_fields || inherited,
                },
                source_url: None,
            }),
            Some(parent.unwrap_or(self.intrinsics.function_prototype)),
        ));
        let prototype = self.new_object_with_proto(parent_prototype);
        self.define(constructor, "prototype", JsValue::Object(prototype));
        self.define(prototype, "constructor", JsValue::Object(constructor));
        Ok(constructor)
    }

    /// Returns `Some(instance_fields)` if `obj` is a class constructor.
    fn constructor_fields(&self, obj: ObjectRef) -> Option<bool> {
        let heap = self.heap.borrow();
        match heap.get(obj)?.function()?.kind {
            FunctionKind::Constructor { instance_fields } => Some(instance_fields),
            FunctionKind::Plain => None,
        }
    }

    /// Creates an error object capturing the current call stack.
    pub fn new_error(&self, kind: ErrorKind, message: &str) -> ObjectRef {
        let error = self.alloc(HeapObject::new(
            ObjectKind::Error {
                kind,
                frames: self.current_stack(),
            },
            Some(self.intrinsics.error_prototype),
        ));
        self.define(error, "name", JsValue::from(kind.name()));
        self.define(error, "message", JsValue::from(message));
        error
    }

    /// Creates a unique symbol.
    pub fn new_symbol(&self, description: &str) -> JsValue {
        let mut symbols = self.symbols.borrow_mut();
        symbols.push(Rc::from(description));
        JsValue::Symbol(SymbolId(symbols.len() as u32 - 1))
    }

    /// The description a symbol was created with.
    pub fn symbol_description(&self, symbol: SymbolId) -> Option<Rc<str>> {
        self.symbols.borrow().get(symbol.0 as usize).cloned()
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Number of native frames currently on the stack.
    pub fn call_depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Current stack, innermost frame first.
    pub fn current_stack(&self) -> Vec<StackFrame> {
        self.frames.borrow().iter().rev().cloned().collect()
    }

    /// Calls `func` with the given receiver and arguments.
    ///
    /// # Errors
    ///
    /// Returns `Err(Thrown)` if `func` is not callable or the call throws; the
    /// exception is left pending on the engine.
    pub fn call(&self, func: &JsValue, this: JsValue, args: &[JsValue]) -> Result<JsValue, Thrown> {
        match func.as_object().filter(|f| self.is_function(&JsValue::Object(*f))) {
            Some(func) => self.invoke(func, this, args, None),
            None => {
                let shown = self.display_string(func);
                Err(self.throw_error(ErrorKind::TypeError, &format!("{} is not a function", shown)))
            }
        }
    }

    /// Reads `obj[name]` and calls it with `obj` as receiver.
    pub fn call_method(&self, obj: ObjectRef, name: &str, args: &[JsValue]) -> Result<JsValue, Thrown> {
        let method = self.get(obj, name)?;
        self.call(&method, JsValue::Object(obj), args)
    }

    /// Applies `new` to a class constructor.
    ///
    /// # Errors
    ///
    /// Throws a `TypeError` if `constructor` is not a class constructor, or
    /// propagates an exception thrown by any constructor in the chain.
    pub fn construct(&self, constructor: &JsValue, args: &[JsValue]) -> Result<JsValue, Thrown> {
        let target = constructor.as_object();
        let Some((target, instance_fields)) =
            target.and_then(|c| self.constructor_fields(c).map(|fields| (c, fields)))
        else {
            let shown = self.display_string(constructor);
            return Err(self.throw_error(
                ErrorKind::TypeError,
                &format!("{} is not a constructor", shown),
            ));
        };

        let prototype = self
            .get(target, "prototype")?
            .as_object()
            .unwrap_or(self.intrinsics.object_prototype);
        let mut instance = if instance_fields {
            self.new_wrapper(Some(prototype))
        } else {
            self.new_object_with_proto(Some(prototype))
        };
        let mark = self.root(JsValue::Object(instance));

        let mut chain = Vec::new();
        let mut current = Some(target);
        while let Some(link) = current {
            if self.constructor_fields(link).is_none() {
                break;
            }
            chain.push(link);
            current = self.prototype_of(link);
        }

        for link in chain.into_iter().rev() {
            let result = self.invoke(link, JsValue::Object(instance), args, Some(target));
            match result {
                Ok(JsValue::Object(replacement)) => {
                    instance = replacement;
                    self.root(JsValue::Object(replacement));
                }
                Ok(_) => {}
                Err(thrown) => {
                    self.handles.borrow_mut().truncate(mark);
                    return Err(thrown);
                }
            }
        }
        self.handles.borrow_mut().truncate(mark);
        Ok(JsValue::Object(instance))
    }

    /// Pushes a handle without opening a scope; returns the previous stack height.
    fn root(&self, value: JsValue) -> usize {
        let mut handles = self.handles.borrow_mut();
        let mark = handles.len();
        handles.push(value);
        mark
    }

    fn invoke(
        &self,
        func: ObjectRef,
        this: JsValue,
        args: &[JsValue],
        new_target: Option<ObjectRef>,
    ) -> Result<JsValue, Thrown> {
        let target = {
            let heap = self.heap.borrow();
            heap.get(func).and_then(HeapObject::function).map(|f| {
                (
                    f.behavior.clone(),
                    f.data.clone(),
                    StackFrame::new(&f.name, f.source_url.as_deref()),
                )
            })
        };
        let Some((behavior, data, frame)) = target else {
            return Err(self.throw_error(ErrorKind::TypeError, "callee is not a function"));
        };
        if self.call_depth() >= self.config.max_call_depth {
            return Err(self.throw_error(ErrorKind::RangeError, "Maximum call stack size exceeded"));
        }

        // Arguments stay rooted for the duration of the call. Truncating
        // directly keeps this internal scope from triggering a collection.
        let mark = {
            let mut handles = self.handles.borrow_mut();
            let mark = handles.len();
            handles.push(JsValue::Object(func));
            handles.push(this.clone());
            args.iter().for_each(|arg| handles.push(arg.clone()));
            mark
        };
        self.frames.borrow_mut().push(frame);
        let info = CallInfo {
            this,
            args: args.to_vec(),
            data,
            callee: func,
            new_target,
        };
        let result = behavior(self, &info);
        self.frames.borrow_mut().pop();
        self.handles.borrow_mut().truncate(mark);
        result
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Makes `value` the pending exception.
    pub fn throw(&self, value: JsValue) -> Thrown {
        *self.exception.borrow_mut() = Some(value);
        Thrown
    }

    /// Creates an error object of `kind` and throws it.
    pub fn throw_error(&self, kind: ErrorKind, message: &str) -> Thrown {
        let error = self.new_error(kind, message);
        self.throw(JsValue::Object(error))
    }

    /// Whether an exception is pending.
    pub fn has_pending_exception(&self) -> bool {
        self.exception.borrow().is_some()
    }

    /// Removes and returns the pending exception.
    pub fn take_exception(&self) -> Option<JsValue> {
        self.exception.borrow_mut().take()
    }

    /// Discards the pending exception.
    pub fn clear_exception(&self) {
        self.exception.borrow_mut().take();
    }

    pub(crate) fn exception_root(&self) -> Option<ObjectRef> {
        self.exception.borrow().as_ref().and_then(JsValue::as_object)
    }

    /// Builds a host-side report for a thrown value.
    ///
    /// Error objects report their kind, `message` and captured stack. Any
    /// other value is reported as a plain `Error` with its string form.
    pub fn error_report(&self, value: &JsValue) -> ScriptError {
        let captured = value.as_object().and_then(|obj| {
            let heap = self.heap.borrow();
            match &heap.get(obj)?.kind {
                ObjectKind::Error { kind, frames } => Some((obj, *kind, frames.clone())),
                _ => None,
            }
        });
        match captured {
            Some((obj, kind, stack)) => {
                let kind = match self.data_property(obj, "name") {
                    Some(JsValue::String(name)) => ErrorKind::from_name(&name),
                    _ => kind,
                };
                let message = self
                    .data_property(obj, "message")
                    .map(|m| self.display_string(&m))
                    .unwrap_or_default();
                ScriptError {
                    kind,
                    message,
                    stack,
                }
            }
            None => ScriptError::new(ErrorKind::Error, self.display_string(value)),
        }
    }

    // ========================================================================
    // Handles and globals
    // ========================================================================

    /// Opens a handle scope.
    pub fn open_scope(&self) -> HandleScope<'_> {
        HandleScope::new(self)
    }

    /// Number of rooted local handles.
    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }

    pub(crate) fn close_scope(&self, mark: usize) {
        self.handles.borrow_mut().truncate(mark);
        let depth = self.open_scopes.get().saturating_sub(1);
        self.open_scopes.set(depth);
        let threshold = self.config.gc_threshold;
        if depth == 0
            && threshold > 0
            && self.call_depth() == 0
            && self.heap.borrow().allocated_since_gc() >= threshold
        {
            self.collect_garbage();
        }
    }

    /// Creates a strong persistent global holding `value`.
    pub fn new_global(&self, value: JsValue) -> GlobalId {
        self.globals.borrow_mut().insert(value)
    }

    /// The value of a global. Returns `None` once reset or after its weak target was collected.
    pub fn global_value(&self, id: GlobalId) -> Option<JsValue> {
        self.globals
            .borrow()
            .get(id)
            .map(|entry| entry.value.clone())
            .filter(|value| !value.is_undefined())
    }

    /// Releases a global. Returns false if it was already released.
    pub fn reset_global(&self, id: GlobalId) -> bool {
        self.globals.borrow_mut().remove(id)
    }

    /// Makes a global weak: it no longer roots its value and `callback`
    /// fires with `parameter` after the value is collected.
    pub fn set_weak(&self, id: GlobalId, parameter: HostPointer, callback: WeakCallback) -> bool {
        match self.globals.borrow_mut().get_mut(id) {
            Some(entry) => {
                entry.weak = Some((parameter, callback));
                true
            }
            None => false,
        }
    }

    /// Makes a weak global strong again.
    pub fn clear_weak(&self, id: GlobalId) -> bool {
        match self.globals.borrow_mut().get_mut(id) {
            Some(entry) => {
                entry.weak = None;
                true
            }
            None => false,
        }
    }

    /// Whether a global is weak.
    pub fn is_weak(&self, id: GlobalId) -> bool {
        self.globals
            .borrow()
            .get(id)
            .is_some_and(|entry| entry.weak.is_some())
    }

    /// Number of live globals.
    pub fn global_count(&self) -> usize {
        self.globals.borrow().len()
    }

    /// Number of live heap objects.
    pub fn live_objects(&self) -> usize {
        self.heap.borrow().live()
    }

    /// Number of completed collections.
    pub fn gc_count(&self) -> u64 {
        self.gc_count.get()
    }
}
