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
use crate::observability::events;
use crate::runtime::timer_runtime;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::trace;

const COMPONENT: &str = "tokio_clock";

struct TokioTimer {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// [`Clock`] backed by tokio timers, one task per scheduled timer.
///
/// Ticks missed while a callback is still running are skipped, so a slow
/// publishing cycle is never run twice in parallel.
pub struct TokioClock {
    handle: Handle,
    next_id: AtomicU64,
    timers: Mutex<HashMap<TimerId, TokioTimer>>,
}

impl TokioClock {
    /// Clock spawning its timer tasks on `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(0),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Uses the ambient runtime when called from inside one, otherwise the
    /// crate's dedicated timer runtime.
    pub fn current_or_dedicated() -> io::Result<Self> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => timer_runtime::handle()?,
        };
        Ok(Self::new(handle))
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<TimerId, TokioTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule_repeating(&self, period: Duration, mut callback: TimerCallback) -> TimerId {
        let timer_id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_in_task = cancelled.clone();
        let period = period.max(Duration::from_millis(1));

        let task = self.handle.spawn(async move {
            let mut interval = interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if cancelled_in_task.load(Ordering::Acquire) {
                    break;
                }
                callback();
            }
        });

        trace!(
            event = events::TIMER_SCHEDULED,
            component = COMPONENT,
            timer_id = %timer_id,
            period_ms = period.as_millis() as u64,
            "scheduled repeating timer"
        );
        self.timers().insert(timer_id, TokioTimer { cancelled, task });
        timer_id
    }

    fn cancel(&self, timer_id: TimerId) {
        let Some(timer) = self.timers().remove(&timer_id) else {
            return;
        };
        timer.cancelled.store(true, Ordering::Release);
        timer.task.abort();
        trace!(
            event = events::TIMER_CANCELLED,
            component = COMPONENT,
            timer_id = %timer_id,
            "cancelled timer"
        );
    }
}

impl Drop for TokioClock {
    fn drop(&mut self) {
        for (_, timer) in self.timers().drain() {
            timer.cancelled.store(true, Ordering::Release);
            timer.task.abort();
        }
    }
}
