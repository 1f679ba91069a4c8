//! Host-side value representation.
//!
//! [`Variant`] is the value type the host application speaks. The bridge
//! converts between it and script values through explicit conversion tables.

use crate::HostPointer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest integer a script number represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// The type tag of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantKind {
    /// No value
    Nil,
    /// Boolean
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// UTF-8 string
    String,
    /// Ordered list of variants
    Array,
    /// String-keyed map of variants
    Dictionary,
    /// Host object reference
    Object,
}

impl VariantKind {
    /// Lower-case name used in script-side property declarations.
    pub fn name(self) -> &'static str {
        match self {
            VariantKind::Nil => "nil",
            VariantKind::Bool => "bool",
            VariantKind::Int => "int",
            VariantKind::Float => "float",
            VariantKind::String => "string",
            VariantKind::Array => "array",
            VariantKind::Dictionary => "dictionary",
            VariantKind::Object => "object",
        }
    }

    /// Parses a name produced by [`VariantKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "nil" => VariantKind::Nil,
            "bool" => VariantKind::Bool,
            "int" => VariantKind::Int,
            "float" => VariantKind::Float,
            "string" => VariantKind::String,
            "array" => VariantKind::Array,
            "dictionary" => VariantKind::Dictionary,
            "object" => VariantKind::Object,
            _ => return None,
        };
        Some(kind)
    }
}

/// Represents any host value.
///
/// # Examples
///
/// ```
/// use core_types::{Variant, VariantKind};
///
/// let nil = Variant::Nil;
/// let number = Variant::Int(42);
/// let text = Variant::from("hello");
///
/// assert!(nil.is_nil());
/// assert_eq!(number.kind(), VariantKind::Int);
/// assert_eq!(text, Variant::String("hello".to_string()));
/// ```
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Variant {
    /// No value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of variants
    Array(Vec<Variant>),
    /// String-keyed map of variants
    Dictionary(BTreeMap<String, Variant>),
    /// Host object reference (`None` is a null object)
    Object(Option<HostPointer>),
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => write!(f, "Nil"),
            Variant::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Variant::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Variant::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Variant::String(s) => f.debug_tuple("String").field(s).finish(),
            Variant::Array(items) => f.debug_list().entries(items).finish(),
            Variant::Dictionary(map) => f.debug_map().entries(map).finish(),
            Variant::Object(Some(p)) => write!(f, "Object({})", p),
            Variant::Object(None) => write!(f, "Object(null)"),
        }
    }
}

impl Variant {
    /// Returns the type tag of this value.
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Nil => VariantKind::Nil,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Int(_) => VariantKind::Int,
            Variant::Float(_) => VariantKind::Float,
            Variant::String(_) => VariantKind::String,
            Variant::Array(_) => VariantKind::Array,
            Variant::Dictionary(_) => VariantKind::Dictionary,
            Variant::Object(_) => VariantKind::Object,
        }
    }

    /// Returns whether this is [`Variant::Nil`].
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    /// Constructs the default value of a kind, used when a typed read falls back.
    ///
    /// ```
    /// use core_types::{Variant, VariantKind};
    ///
    /// assert_eq!(Variant::default_of(VariantKind::Int), Variant::Int(0));
    /// assert_eq!(Variant::default_of(VariantKind::Object), Variant::Object(None));
    /// ```
    pub fn default_of(kind: VariantKind) -> Variant {
        match kind {
            VariantKind::Nil => Variant::Nil,
            VariantKind::Bool => Variant::Bool(false),
            VariantKind::Int => Variant::Int(0),
            VariantKind::Float => Variant::Float(0.0),
            VariantKind::String => Variant::String(String::new()),
            VariantKind::Array => Variant::Array(Vec::new()),
            VariantKind::Dictionary => Variant::Dictionary(BTreeMap::new()),
            VariantKind::Object => Variant::Object(None),
        }
    }

    /// Coerces this value to `kind` where the conversion is lossless or
    /// conventional (int ↔ float, nil → null object). Returns `None` otherwise.
    pub fn coerce(self, kind: VariantKind) -> Option<Variant> {
        if self.kind() == kind {
            return Some(self);
        }
        match (self, kind) {
            (Variant::Int(n), VariantKind::Float) => Some(Variant::Float(n as f64)),
            (Variant::Float(n), VariantKind::Int) if n.fract() == 0.0 && n.is_finite() => {
                Some(Variant::Int(n as i64))
            }
            (Variant::Nil, VariantKind::Object) => Some(Variant::Object(None)),
            (_, VariantKind::Nil) => Some(Variant::Nil),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Float(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<HostPointer> for Variant {
    fn from(value: HostPointer) -> Self {
        Variant::Object(Some(value))
    }
}
