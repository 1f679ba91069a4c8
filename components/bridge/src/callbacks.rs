//! Token-based entry points for host object hooks.
//!
//! The host installs these when an object is bound (see
//! [`HostObjectModel::on_bound`](crate::HostObjectModel::on_bound)). They are
//! the only entry points that may be reached from a foreign thread, and
//! reject such calls without touching environment state.

use crate::{store, BridgeResult};
use core_types::{EnvironmentToken, HostPointer};
use log::warn;
use script_engine::Engine;

/// A host reference to `pointer` was taken (`inc`) or released.
///
/// Returns whether the host may destroy the object now: true only for
/// pointers with no binding.
pub fn reference_callback(
    token: EnvironmentToken,
    pointer: HostPointer,
    inc: bool,
) -> BridgeResult<bool> {
    let env = store::access(token)?;
    env.reference_object(pointer, inc)
}

/// The host destroyed `pointer` on its own; sever the wrapper link.
pub fn free_callback(token: EnvironmentToken, pointer: HostPointer) -> BridgeResult<()> {
    let env = store::access(token)?;
    env.free_object(pointer, false)
}

/// Weak callback armed on demoted wrappers: the wrapper was collected.
pub(crate) fn object_gc_callback(engine: &Engine, pointer: HostPointer) {
    let Some(token) = engine.embedder_token() else {
        return;
    };
    match store::access(token) {
        Ok(env) => {
            if let Err(err) = env.free_object(pointer, true) {
                warn!("failed to finalize {}: {}", pointer, err);
            }
        }
        Err(err) => warn!("wrapper of {} collected without environment: {}", pointer, err),
    }
}
