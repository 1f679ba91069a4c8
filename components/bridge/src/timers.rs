//! Script timers driven by [`Environment::update`](crate::Environment::update).

use script_engine::GlobalId;
use std::collections::BTreeMap;

/// Id of a timer, as returned to scripts by `setTimeout` and `setInterval`.
pub type TimerId = u32;

#[derive(Debug)]
struct Timer {
    callback: GlobalId,
    due: u64,
    interval: Option<u64>,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTimer {
    /// The timer
    pub id: TimerId,
    /// Global holding the callback
    pub callback: GlobalId,
    /// One-shot timers are gone once due; the caller resets the callback global
    pub finished: bool,
}

/// Timers ordered by id, against a virtual clock advanced by `tick`.
#[derive(Debug)]
pub struct TimerManager {
    now: u64,
    next_id: TimerId,
    timers: BTreeMap<TimerId, Timer>,
}

impl Default for TimerManager {
    fn default() -> Self {
        Self {
            now: 0,
            next_id: 1,
            timers: BTreeMap::new(),
        }
    }
}

impl TimerManager {
    /// Schedules `callback` after `delay` milliseconds, repeating if `repeat` is set.
    pub fn add(&mut self, callback: GlobalId, delay: u64, repeat: bool) -> TimerId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.timers.insert(
            id,
            Timer {
                callback,
                due: self.now + delay,
                interval: repeat.then_some(delay.max(1)),
            },
        );
        id
    }

    /// Cancels a timer and returns its callback global.
    pub fn clear(&mut self, id: TimerId) -> Option<GlobalId> {
        self.timers.remove(&id).map(|timer| timer.callback)
    }

    /// Advances the clock. Returns whether any timer is due.
    pub fn tick(&mut self, delta_msecs: u64) -> bool {
        self.now += delta_msecs;
        self.timers.values().any(|timer| timer.due <= self.now)
    }

    /// Collects due timers, earliest first. Intervals are rescheduled.
    pub fn take_due(&mut self) -> Vec<DueTimer> {
        let now = self.now;
        let mut due: Vec<(u64, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(id, timer)| (timer.due, *id))
            .collect();
        due.sort_unstable();

        let mut fired = Vec::with_capacity(due.len());
        for (_, id) in due {
            let Some(timer) = self.timers.get_mut(&id) else {
                continue;
            };
            let callback = timer.callback;
            let finished = match timer.interval {
                Some(interval) => {
                    timer.due = now + interval;
                    false
                }
                None => {
                    self.timers.remove(&id);
                    true
                }
            };
            fired.push(DueTimer {
                id,
                callback,
                finished,
            });
        }
        fired
    }

    /// Removes every timer and returns their callback globals.
    pub fn clear_all(&mut self) -> Vec<GlobalId> {
        std::mem::take(&mut self.timers)
            .into_values()
            .map(|timer| timer.callback)
            .collect()
    }

    /// Number of scheduled timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is scheduled.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
