//! Identifiers used across the bridge.
//!
//! Registries hand out [`SlotId`]-based ids instead of raw host pointers so a
//! stale id can never alias a slot that was freed and reused.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// A generational index into a slot table.
///
/// This is a packed `{ index: u32, generation: u32 }`. A `SlotId` is only
/// valid while the slot at `index` is occupied and its generation matches.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u64);

impl SlotId {
    /// Packs an index and a generation.
    pub fn from_parts(index: u32, generation: u32) -> Self {
        Self((index as u64) | ((generation as u64) << 32))
    }

    /// The slot index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation of the slot when this id was issued.
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The packed representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Rebuilds an id from its packed representation.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index(), self.generation())
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index(), self.generation())
    }
}

macro_rules! slot_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub SlotId);

        impl From<SlotId> for $name {
            fn from(id: SlotId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for SlotId {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

slot_id!(
    /// Stable id of an object binding.
    ObjectId
);
slot_id!(
    /// Id of a cached script function reference.
    FunctionId
);
slot_id!(
    /// Id of a script class registered from a module.
    ScriptClassId
);
slot_id!(
    /// Id of a cached script module.
    ModuleId
);

/// Id of a native class. Native classes are never unregistered, so this is a
/// plain index into the class table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeClassId(pub u32);

impl fmt::Display for NativeClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of a host object.
///
/// The bridge never dereferences it; it is only used as a map key and handed
/// back to the host object model.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPointer(NonZeroUsize);

impl HostPointer {
    /// Wraps a raw address. Returns `None` for the null address.
    pub fn new(address: usize) -> Option<Self> {
        NonZeroUsize::new(address).map(Self)
    }

    /// The raw address.
    pub fn address(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for HostPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostPointer({:#x})", self.0)
    }
}

impl fmt::Display for HostPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque token identifying a live environment in the process-wide store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentToken(pub u64);

impl fmt::Display for EnvironmentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env#{}", self.0)
    }
}
