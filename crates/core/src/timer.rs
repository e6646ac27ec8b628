// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot timer scheduler, polled by the supervisor loop.
//!
//! Timers are armed with an absolute deadline and fire at most once; a fired
//! timer is disabled until explicitly rearmed. The loop polls `fired` on a
//! coarse interval, so deadlines have tick-resolution accuracy, which is
//! plenty for heartbeat-scale periods.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The supervisor's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Periodic heartbeat to the control plane.
    Heartbeat,
    /// Retry of a failed registration, armed with the current backoff.
    RegisterRetry,
    /// Periodic observational log of the client's connection state.
    HealthCheck,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    deadlines: HashMap<TimerId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id` to fire at `deadline`. An already-armed timer is rearmed.
    pub fn schedule(&mut self, id: TimerId, deadline: Instant) {
        self.deadlines.insert(id, deadline);
    }

    /// Arm `id` to fire `delay` from now.
    pub fn schedule_after(&mut self, id: TimerId, delay: Duration) {
        self.schedule(id, Instant::now() + delay);
    }

    /// Disarm `id`. Returns whether it was armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.deadlines.remove(&id).is_some()
    }

    pub fn enabled(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Drain every timer due at `now`, earliest deadline first. Fired
    /// timers are disabled.
    pub fn fired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);

        let fired: Vec<TimerId> = due.into_iter().map(|(_, id)| id).collect();
        for id in &fired {
            self.deadlines.remove(id);
        }
        fired
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
