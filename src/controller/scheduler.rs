//! Ordered one-shot timer queue with explicit cancellation.
//!
//! The controller owns a single [`Scheduler`]. Every armed timer gets a
//! [`TimerId`]; cancelling an id guarantees its event is never delivered.
//! Events with the same due time are delivered in arming order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle of an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

/// Events the controller schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledEvent {
    /// Periodic cycle trigger
    Tick,
    /// First cycle after startup
    StartupSettle,
    /// Sweep stability check
    SweepCheck,
    /// End of a heating run
    HeatingComplete,
}

/// Min-heap of pending timers.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<(DateTime<Utc>, TimerId)>>,
    entries: HashMap<TimerId, ScheduledEvent>,
    cancelled: HashSet<TimerId>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `event` at `due`.
    pub fn schedule(&mut self, due: DateTime<Utc>, event: ScheduledEvent) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.queue.push(Reverse((due, id)));
        self.entries.insert(id, event);
        id
    }

    /// Cancel a timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if self.entries.remove(&id).is_some() {
            self.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// Cancel the timer in `slot`, if any, and clear the slot.
    pub fn cancel_slot(&mut self, slot: &mut Option<TimerId>) {
        if let Some(id) = slot.take() {
            self.cancel(id);
        }
    }

    /// Cancel everything.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.entries.clear();
        self.cancelled.clear();
    }

    /// Due time of the earliest live timer.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        self.discard_cancelled();
        self.queue.peek().map(|Reverse((due, _))| *due)
    }

    /// Remove and return the earliest live timer due at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TimerId, ScheduledEvent)> {
        self.discard_cancelled();
        let Reverse((due, _)) = self.queue.peek()?;
        if *due > now {
            return None;
        }
        let Reverse((_, id)) = self.queue.pop()?;
        self.entries.remove(&id).map(|event| (id, event))
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is still armed.
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.queue.peek() {
            if self.cancelled.remove(id) {
                self.queue.pop();
            } else {
                break;
            }
        }
    }
}
