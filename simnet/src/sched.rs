//! A deterministic scheduler over virtual time.
//!
//! Tasks are ordered by their due time and, among tasks due at the same instant, by the order in
//! which they were scheduled. Popping a task advances the clock to its due time. The clock never
//! moves backwards and never moves on its own.
use std::collections::BTreeMap;
use core::fmt;

use crate::time::{Duration, Instant};

/// Identifies a scheduled task for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

/// A queue of tasks ordered by due time.
pub struct Scheduler<T> {
    now: Instant,
    seq: u64,
    queue: BTreeMap<(Instant, u64), T>,
    index: BTreeMap<u64, Instant>,
}

impl<T> Scheduler<T> {
    /// An empty scheduler at time zero.
    pub fn new() -> Self {
        Scheduler {
            now: Instant::ZERO,
            seq: 0,
            queue: BTreeMap::new(),
            index: BTreeMap::new(),
        }
    }

    /// The current virtual time.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Schedule a task to run `delay` after the current time.
    pub fn schedule(&mut self, task: T, delay: Duration) -> TaskId {
        let due = self.now + delay;
        let seq = self.seq;
        self.seq += 1;
        self.queue.insert((due, seq), task);
        self.index.insert(seq, due);
        TaskId(seq)
    }

    /// Remove a task that has not run yet.
    pub fn unschedule(&mut self, id: TaskId) -> Option<T> {
        let due = self.index.remove(&id.0)?;
        self.queue.remove(&(due, id.0))
    }

    /// The due time of the next task.
    pub fn peek_due(&self) -> Option<Instant> {
        self.queue.keys().next().map(|&(due, _)| due)
    }

    /// Take the next task and advance the clock to its due time.
    pub fn pop(&mut self) -> Option<T> {
        let key = *self.queue.keys().next()?;
        self.take(key)
    }

    /// Take the next task if it is due no later than `deadline`.
    pub fn pop_due(&mut self, deadline: Instant) -> Option<T> {
        let key = *self.queue.keys().next()?;
        if key.0 > deadline {
            return None;
        }
        self.take(key)
    }

    /// Move the clock forward without running anything.
    ///
    /// Does nothing when `time` lies in the past.
    pub fn advance_to(&mut self, time: Instant) {
        if time > self.now {
            self.now = time;
        }
    }

    /// The number of tasks waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Query whether no task waits.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn take(&mut self, key: (Instant, u64)) -> Option<T> {
        let task = self.queue.remove(&key)?;
        self.index.remove(&key.1);
        self.advance_to(key.0);
        Some(task)
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "task{}", self.0)
    }
}
