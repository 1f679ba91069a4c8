//! Mark-and-sweep collection.
//!
//! Roots are the intrinsics, local handles, strong globals and the pending
//! exception. Weak globals whose targets are unreachable are cleared before
//! the sweep; their callbacks run afterwards, once no heap borrow is held,
//! so a callback may reenter the engine.

use crate::Engine;
use log::debug;

/// Result of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects freed
    pub collected: usize,
    /// Weak callbacks invoked
    pub weak_callbacks: usize,
}

impl Engine {
    /// Runs a full collection.
    ///
    /// Reentrant calls (from a weak callback) are ignored and report nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use script_engine::Engine;
    ///
    /// let engine = Engine::default();
    /// let before = engine.live_objects();
    /// engine.new_object();
    /// let stats = engine.collect_garbage();
    ///
    /// assert_eq!(stats.collected, 1);
    /// assert_eq!(engine.live_objects(), before);
    /// ```
    pub fn collect_garbage(&self) -> GcStats {
        if self.collecting.replace(true) {
            return GcStats::default();
        }

        let (collected, pending) = {
            let mut roots = self.intrinsics.roots().to_vec();
            self.handles.borrow().roots(&mut roots);
            self.globals.borrow().strong_roots(&mut roots);
            roots.extend(self.exception_root());

            let mut heap = self.heap.borrow_mut();
            heap.mark(roots);
            let pending = self
                .globals
                .borrow_mut()
                .clear_dead_weak(|obj| heap.is_marked(obj));
            (heap.sweep(), pending)
        };

        self.gc_count.set(self.gc_count.get() + 1);
        debug!(
            "gc #{}: collected {} objects, {} weak callbacks",
            self.gc_count.get(),
            collected,
            pending.len()
        );

        for (parameter, callback) in &pending {
            callback(self, *parameter);
        }
        self.collecting.set(false);

        GcStats {
            collected,
            weak_callbacks: pending.len(),
        }
    }
}
