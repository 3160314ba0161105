//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

/// Discrete-event timer queue.
///
/// Time is virtual and expressed as the [`Duration`] elapsed since the
/// scheduler was created. Timers are keyed by `(deadline, id)`, where `id` is
/// a monotonically increasing counter, so timers sharing the same deadline
/// expire in the order they were scheduled.
#[derive(Debug)]
pub struct Scheduler<M> {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), M>,
}

/// A handle to a timer created by [`Scheduler::schedule`].
///
/// The handle doesn't cancel the timer when dropped; the owning record is
/// expected to call [`Scheduler::cancel`] before discarding it. Expiration
/// handlers compare the expired timer ID against the handle stored in the
/// owning record, so a stale expiration is never mistaken for a live one.
#[derive(Debug, Eq, PartialEq)]
pub struct TimeoutTask {
    id: u64,
    deadline: Duration,
}

// ===== impl Scheduler =====

impl<M> Scheduler<M> {
    pub fn new() -> Scheduler<M> {
        Scheduler {
            now: Duration::ZERO,
            next_id: 0,
            queue: BTreeMap::new(),
        }
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedules `msg` to be delivered once `timeout` elapses.
    pub fn schedule(&mut self, timeout: Duration, msg: M) -> TimeoutTask {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = self.now + timeout;
        self.queue.insert((deadline, id), msg);
        TimeoutTask { id, deadline }
    }

    /// Cancels a timer.
    ///
    /// Cancelling a timer that has already expired or was already cancelled
    /// is a no-op.
    pub fn cancel(&mut self, task: &TimeoutTask) {
        self.queue.remove(&(task.deadline, task.id));
    }

    /// Returns whether the timer is still waiting to expire.
    pub fn is_pending(&self, task: &TimeoutTask) -> bool {
        self.queue.contains_key(&(task.deadline, task.id))
    }

    /// Returns the remaining time before the timer expires.
    pub fn remaining(&self, task: &TimeoutTask) -> Duration {
        task.deadline.saturating_sub(self.now)
    }

    /// Returns the deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Returns the number of pending timers.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Removes the earliest timer whose deadline is not later than `until`,
    /// moving the clock forward to its deadline.
    pub fn pop_expired(&mut self, until: Duration) -> Option<(u64, M)> {
        let (deadline, _) = *self.queue.keys().next()?;
        if deadline > until {
            return None;
        }
        let ((deadline, id), msg) = self.queue.pop_first()?;
        self.now = std::cmp::max(self.now, deadline);
        Some((id, msg))
    }

    /// Moves the clock forward. The clock never goes backwards.
    pub fn advance(&mut self, time: Duration) {
        self.now = std::cmp::max(self.now, time);
    }
}

impl<M> Default for Scheduler<M> {
    fn default() -> Scheduler<M> {
        Scheduler::new()
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

// ===== global functions =====

// Cancels the timer stored in the given slot, if any.
pub(crate) fn stop<M>(
    slot: &mut Option<TimeoutTask>,
    scheduler: &mut Scheduler<M>,
) {
    if let Some(task) = slot.take() {
        scheduler.cancel(&task);
    }
}

// Checks whether the expired timer is the one stored in the given slot. On a
// match the slot is cleared.
pub(crate) fn expired(slot: &mut Option<TimeoutTask>, id: u64) -> bool {
    if slot.as_ref().is_some_and(|task| task.id == id) {
        *slot = None;
        true
    } else {
        false
    }
}

// ===== unit tests =====
