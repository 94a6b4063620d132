/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use super::{Clock, TimerCallback, TimerId};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const MIN_PERIOD: Duration = Duration::from_millis(1);

struct ManualTimer {
    period: Duration,
    next_due: Duration,
    // Taken out while the callback runs so the lock is not held across it.
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, ManualTimer>,
}

/// Deterministic clock for tests; time only moves through [`advance`](Self::advance).
///
/// Due timers fire in deadline order (ties by scheduling order) and `now()`
/// reads the deadline being fired while a callback runs.
pub struct ManualClock {
    origin: Instant,
    utc_origin: DateTime<Utc>,
    state: Mutex<ManualState>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock whose `utc_now()` starts at `utc_origin`.
    pub fn starting_at(utc_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            utc_origin,
            state: Mutex::new(ManualState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time advanced so far.
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    pub fn active_timers(&self) -> usize {
        self.state().timers.len()
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Moves time forward by `duration`, firing every timer that falls due.
    pub fn advance(&self, duration: Duration) {
        let target = self.state().elapsed + duration;

        loop {
            let (timer_id, mut callback) = {
                let mut state = self.state();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.callback.is_some() && timer.next_due <= target)
                    .min_by_key(|(timer_id, timer)| (timer.next_due, **timer_id))
                    .map(|(timer_id, _)| *timer_id);

                let Some(timer_id) = due else {
                    state.elapsed = target;
                    return;
                };
                let Some(timer) = state.timers.get_mut(&timer_id) else {
                    return;
                };
                let fire_at = timer.next_due;
                timer.next_due += timer.period;
                let Some(callback) = timer.callback.take() else {
                    return;
                };
                state.elapsed = state.elapsed.max(fire_at);
                (timer_id, callback)
            };

            callback();

            // A timer cancelled from inside its own callback is gone by now.
            if let Some(timer) = self.state().timers.get_mut(&timer_id) {
                timer.callback = Some(callback);
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.elapsed())
            .ok()
            .and_then(|elapsed| self.utc_origin.checked_add_signed(elapsed))
            .unwrap_or(self.utc_origin)
    }

    fn schedule_repeating(&self, period: Duration, callback: TimerCallback) -> TimerId {
        let period = period.max(MIN_PERIOD);
        let mut state = self.state();
        state.next_id += 1;
        let timer_id = TimerId(state.next_id);
        let next_due = state.elapsed + period;
        state.timers.insert(
            timer_id,
            ManualTimer {
                period,
                next_due,
                callback: Some(callback),
            },
        );
        timer_id
    }

    fn cancel(&self, timer_id: TimerId) {
        self.state().timers.remove(&timer_id);
    }
}
