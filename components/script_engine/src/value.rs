//! Script values.
//!
//! A [`JsValue`] is a cheap, clonable reference to script data. Objects are
//! referenced through [`ObjectRef`], a generational id into the engine heap,
//! so a value held after its object was collected is detected as stale rather
//! than aliasing a new object.

use core_types::SlotId;
use std::fmt;
use std::rc::Rc;

/// Reference to a heap object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) SlotId);

impl ObjectRef {
    /// The heap slot id of this object.
    pub fn id(self) -> SlotId {
        self.0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.0)
    }
}

/// A unique symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SymbolId(pub(crate) u32);

/// Represents any script value.
///
/// # Examples
///
/// ```
/// use script_engine::JsValue;
///
/// let n = JsValue::from(1.5);
/// assert_eq!(n.as_number(), Some(1.5));
/// assert!(JsValue::Undefined.is_nullish());
/// assert_eq!(JsValue::from("hi").as_str(), Some("hi"));
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
pub enum JsValue {
    /// The `undefined` value
    #[default]
    Undefined,
    /// The `null` value
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE-754 double
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Symbol
    Symbol(SymbolId),
    /// Object reference
    Object(ObjectRef),
}

impl JsValue {
    /// Creates a string value.
    pub fn string(text: &str) -> Self {
        JsValue::String(Rc::from(text))
    }

    /// Returns the object reference if this is an object.
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            JsValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Returns the string contents if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the symbol if this is a symbol.
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            JsValue::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    /// `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    /// ToBoolean.
    pub fn is_truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Boolean(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Symbol(_) | JsValue::Object(_) => true,
        }
    }
}

/// Formats a number the way the script language prints it.
///
/// ```
/// use script_engine::format_number;
///
/// assert_eq!(format_number(3.0), "3");
/// assert_eq!(format_number(0.5), "0.5");
/// assert_eq!(format_number(f64::NAN), "NaN");
/// ```
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<bool> for JsValue {
    fn from(value: bool) -> Self {
        JsValue::Boolean(value)
    }
}

impl From<f64> for JsValue {
    fn from(value: f64) -> Self {
        JsValue::Number(value)
    }
}

impl From<i32> for JsValue {
    fn from(value: i32) -> Self {
        JsValue::Number(value as f64)
    }
}

impl From<&str> for JsValue {
    fn from(value: &str) -> Self {
        JsValue::string(value)
    }
}

impl From<String> for JsValue {
    fn from(value: String) -> Self {
        JsValue::String(Rc::from(value))
    }
}

impl From<ObjectRef> for JsValue {
    fn from(value: ObjectRef) -> Self {
        JsValue::Object(value)
    }
}
