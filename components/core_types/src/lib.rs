//! Core host-side types shared by the script engine and the bridge.
//!
//! This crate provides the foundational types that cross the boundary between
//! a host application and an embedded script engine.
//!
//! # Overview
//!
//! - [`Variant`] - Tagged representation of host values
//! - [`VariantKind`] - The type tag of a [`Variant`]
//! - [`HostPointer`] - Opaque identity of a host object
//! - [`SlotId`] - Generational index used by every slot table
//! - [`SlotTable`] - Reusable slot storage addressed by [`SlotId`]
//! - [`ScriptError`] - A captured script exception with its stack
//! - [`ErrorKind`] - Script error classes
//!
//! # Examples
//!
//! ```
//! use core_types::{Variant, VariantKind, HostPointer};
//!
//! let value = Variant::Int(42);
//! assert_eq!(value.kind(), VariantKind::Int);
//!
//! let pointer = HostPointer::new(0x1000).unwrap();
//! assert_eq!(Variant::Object(Some(pointer)).kind(), VariantKind::Object);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod ids;
mod slot_table;
mod source;
mod variant;

pub use error::{ErrorKind, ScriptError};
pub use ids::{
    EnvironmentToken, FunctionId, HostPointer, ModuleId, NativeClassId, ObjectId, ScriptClassId,
    SlotId,
};
pub use slot_table::SlotTable;
pub use source::StackFrame;
pub use variant::{Variant, VariantKind, MAX_SAFE_INTEGER};
