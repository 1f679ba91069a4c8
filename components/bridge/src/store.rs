//! Process-wide registry of live environments.
//!
//! Host callbacks carry an [`EnvironmentToken`] rather than a reference. A
//! token is resolved under the store lock and only on the thread that owns
//! the environment; any other thread is rejected before it can touch
//! environment state.

use crate::{BridgeError, BridgeResult, Environment};
use core_types::EnvironmentToken;
use log::trace;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

static OWNERS: Mutex<BTreeMap<EnvironmentToken, ThreadId>> = parking_lot::const_mutex(BTreeMap::new());

thread_local! {
    static LOCAL: RefCell<HashMap<EnvironmentToken, Weak<Environment>>> = RefCell::new(HashMap::new());
}

/// Allocates a fresh token.
pub(crate) fn next_token() -> EnvironmentToken {
    EnvironmentToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
}

/// Registers an environment owned by the current thread.
pub(crate) fn register(token: EnvironmentToken, env: Weak<Environment>) {
    OWNERS.lock().insert(token, thread::current().id());
    LOCAL.with(|local| local.borrow_mut().insert(token, env));
    trace!("environment {} registered", token);
}

/// Removes an environment. Returns false if the token was unknown.
pub(crate) fn unregister(token: EnvironmentToken) -> bool {
    let removed = OWNERS.lock().remove(&token).is_some();
    // Thread-local storage may already be gone during thread teardown.
    let _ = LOCAL.try_with(|local| local.borrow_mut().remove(&token));
    trace!("environment {} unregistered", token);
    removed
}

/// Resolves a token on the calling thread.
///
/// # Errors
///
/// * [`BridgeError::UnknownEnvironment`] if the token was never issued, was
///   removed, or its environment is being destroyed
/// * [`BridgeError::WrongThread`] if another thread owns the environment
pub fn access(token: EnvironmentToken) -> BridgeResult<Rc<Environment>> {
    let owner = OWNERS.lock().get(&token).copied();
    match owner {
        None => Err(BridgeError::UnknownEnvironment),
        Some(owner) if owner != thread::current().id() => Err(BridgeError::WrongThread),
        Some(_) => LOCAL
            .with(|local| local.borrow().get(&token).and_then(Weak::upgrade))
            .ok_or(BridgeError::UnknownEnvironment),
    }
}

/// Whether a token names a registered environment, on any thread.
pub fn is_registered(token: EnvironmentToken) -> bool {
    OWNERS.lock().contains_key(&token)
}

/// Number of registered environments across all threads.
pub fn count() -> usize {
    OWNERS.lock().len()
}
