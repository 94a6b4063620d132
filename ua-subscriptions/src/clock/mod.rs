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

//! Time source and repeating-timer scheduler.
//!
//! Subscriptions and monitored items never touch tokio timers directly; they go
//! through [`Clock`] so tests can drive publishing cycles deterministically with
//! [`ManualClock`] while servers run on [`TokioClock`].

mod manual;
mod tokio_clock;

pub use manual::ManualClock;
pub use tokio_clock::TokioClock;

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies one scheduled repeating timer of a [`Clock`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

pub trait Clock: Send + Sync {
    /// Monotonic time, used for retransmission ages and publish timeouts.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for publish times and value timestamps.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Runs `callback` every `period` until cancelled. The first call happens
    /// one period after scheduling. Calls of one timer never overlap.
    fn schedule_repeating(&self, period: Duration, callback: TimerCallback) -> TimerId;

    /// Stops the timer. Unknown or already cancelled ids are ignored.
    fn cancel(&self, timer_id: TimerId);
}

/// Owns a scheduled timer; cancels it on [`cancel`](Self::cancel) or drop.
pub struct TimerHandle {
    clock: Arc<dyn Clock>,
    timer_id: Option<TimerId>,
}

impl TimerHandle {
    pub fn schedule(clock: &Arc<dyn Clock>, period: Duration, callback: TimerCallback) -> Self {
        let timer_id = clock.schedule_repeating(period, callback);
        Self {
            clock: clock.clone(),
            timer_id: Some(timer_id),
        }
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        self.timer_id
    }

    pub fn is_active(&self) -> bool {
        self.timer_id.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(timer_id) = self.timer_id.take() {
            self.clock.cancel(timer_id);
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("timer_id", &self.timer_id)
            .finish()
    }
}
