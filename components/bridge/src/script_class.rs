//! Script classes: module default exports that extend a native class.

use core_types::{ModuleId, NativeClassId, VariantKind};
use indexmap::IndexMap;
use script_engine::GlobalId;

/// Static property on a script class constructor listing its exported
/// properties as `{ name: "kind" }`, kinds named as by [`VariantKind::name`].
pub const PROPERTIES_KEY: &str = "__properties__";

/// Describes one exported script property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptPropertyInfo {
    /// Property name
    pub name: String,
    /// Declared value kind
    pub kind: VariantKind,
}

impl ScriptPropertyInfo {
    /// Creates a property descriptor.
    pub fn new(name: impl Into<String>, kind: VariantKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Default object of a script class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultObject {
    /// Not constructed yet
    Pending,
    /// Construction failed; defaults fall back to the kind's default value
    Failed,
    /// The constructed instance
    Ready(GlobalId),
}

/// A script class registered from a module.
#[derive(Debug, Clone)]
pub struct ScriptClassInfo {
    /// Defining module
    pub module_id: ModuleId,
    /// Class name
    pub name: String,
    /// Nearest native ancestor
    pub native_class_id: NativeClassId,
    /// Global holding the constructor
    pub constructor: GlobalId,
    /// Lazily constructed default instance
    pub default_object: DefaultObject,
    /// Exported properties in declaration order
    pub properties: IndexMap<String, ScriptPropertyInfo>,
}
