//! Per-binding ownership state.
//!
//! A binding is owned either by the host ([`BindingPolicy::External`]) or by
//! the script collector ([`BindingPolicy::Managed`]). Host references are
//! counted; the script reference is strong while the count is positive and
//! weak otherwise, except that an external binding starts strong at zero
//! until the host has taken and released its first reference.
//!
//! | policy   | initial        | 0 → 1   | 1 → 0  |
//! |----------|----------------|---------|--------|
//! | external | strong, 0 refs | none    | demote |
//! | managed  | weak, 0 refs   | promote | demote |

use std::fmt;

/// Who owns the lifetime of a bound host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingPolicy {
    /// The host owns the object; the script reference starts strong
    External,
    /// The script collector owns the object; the script reference starts weak
    Managed,
}

/// Strength of the script-side reference held by a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strength {
    /// The wrapper may be collected
    Weak,
    /// The wrapper is rooted
    Strong,
}

/// Engine action requested by a refcount transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Make the script reference strong
    Promote,
    /// Make the script reference weak and arm the finalizer
    Demote,
    /// Leave the script reference alone
    Unchanged,
}

/// A decrement was requested with no outstanding host reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefCountUnderflow;

/// Ownership state of one binding.
///
/// # Examples
///
/// ```
/// use bridge::{BindingPolicy, BindingState, Strength, Transition};
///
/// let mut state = BindingState::new(BindingPolicy::Managed);
/// assert_eq!(state.strength(), Strength::Weak);
///
/// assert_eq!(state.reference(true), Ok(Transition::Promote));
/// assert_eq!(state.reference(false), Ok(Transition::Demote));
/// assert_eq!(state.strength(), Strength::Weak);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BindingState {
    policy: BindingPolicy,
    strength: Strength,
    ref_count: u32,
}

impl BindingState {
    /// Initial state for a new binding.
    pub fn new(policy: BindingPolicy) -> Self {
        let strength = match policy {
            BindingPolicy::External => Strength::Strong,
            BindingPolicy::Managed => Strength::Weak,
        };
        Self {
            policy,
            strength,
            ref_count: 0,
        }
    }

    /// The binding policy.
    pub fn policy(&self) -> BindingPolicy {
        self.policy
    }

    /// Current strength of the script reference.
    pub fn strength(&self) -> Strength {
        self.strength
    }

    /// Number of outstanding host references.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Applies one host reference change and returns the engine action.
    ///
    /// # Errors
    ///
    /// A decrement at zero is rejected and leaves the state untouched.
    pub fn reference(&mut self, inc: bool) -> Result<Transition, RefCountUnderflow> {
        if inc {
            self.ref_count += 1;
            if self.ref_count == 1 && self.strength == Strength::Weak {
                self.strength = Strength::Strong;
                return Ok(Transition::Promote);
            }
            return Ok(Transition::Unchanged);
        }

        if self.ref_count == 0 {
            return Err(RefCountUnderflow);
        }
        self.ref_count -= 1;
        if self.ref_count == 0 && self.strength == Strength::Strong {
            self.strength = Strength::Weak;
            return Ok(Transition::Demote);
        }
        Ok(Transition::Unchanged)
    }
}

impl fmt::Debug for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}/{}", self.policy, self.strength, self.ref_count)
    }
}
