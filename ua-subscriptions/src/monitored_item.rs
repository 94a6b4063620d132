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

//! A single sampled attribute with its bounded notification queue.

use crate::clock::TimerHandle;
use crate::error::ConfigError;
use crate::observability::events;
use crate::types::{
    DataValue, MonitoredItemHandle, MonitoredItemNotification, MonitoringMode, ReadValueId,
    TimestampsToReturn,
};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

const COMPONENT: &str = "monitored_item";

/// Emitted on every sampling tick of an enabled item.
///
/// Carries the previously recorded value so the node manager can apply its
/// own change detection before anything is recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingEvent {
    pub handle: MonitoredItemHandle,
    pub item_to_monitor: ReadValueId,
    pub previous_value: Option<DataValue>,
}

/// Revised, validated parameters a monitored item is built from.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitoredItemSettings {
    pub client_handle: u32,
    pub item_to_monitor: ReadValueId,
    pub monitoring_mode: MonitoringMode,
    pub sampling_interval: f64,
    pub queue_size: usize,
    pub discard_oldest: bool,
    pub timestamps_to_return: TimestampsToReturn,
}

#[derive(Debug)]
pub struct MonitoredItem {
    monitored_item_id: u32,
    settings: MonitoredItemSettings,
    queue: VecDeque<DataValue>,
    overflow: bool,
    last_value: Option<DataValue>,
    sampling_timer: Option<TimerHandle>,
    terminated: bool,
}

impl MonitoredItem {
    /// Fails fast on a queue size below 1 or a negative sampling interval.
    pub fn new(monitored_item_id: u32, settings: MonitoredItemSettings) -> Result<Self, ConfigError> {
        if settings.queue_size < 1 {
            return Err(ConfigError::InvalidQueueSize(settings.queue_size));
        }
        if settings.sampling_interval < 0.0 || settings.sampling_interval.is_nan() {
            return Err(ConfigError::NegativeSamplingInterval(
                settings.sampling_interval,
            ));
        }

        Ok(Self {
            monitored_item_id,
            queue: VecDeque::with_capacity(settings.queue_size.min(64)),
            settings,
            overflow: false,
            last_value: None,
            sampling_timer: None,
            terminated: false,
        })
    }

    pub fn monitored_item_id(&self) -> u32 {
        self.monitored_item_id
    }

    pub fn client_handle(&self) -> u32 {
        self.settings.client_handle
    }

    pub fn item_to_monitor(&self) -> &ReadValueId {
        &self.settings.item_to_monitor
    }

    pub fn monitoring_mode(&self) -> MonitoringMode {
        self.settings.monitoring_mode
    }

    /// Milliseconds; 0 means the item is only fed by pushed changes.
    pub fn sampling_interval(&self) -> f64 {
        self.settings.sampling_interval
    }

    pub fn queue_size(&self) -> usize {
        self.settings.queue_size
    }

    pub fn discard_oldest(&self) -> bool {
        self.settings.discard_oldest
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_values(&self) -> impl Iterator<Item = &DataValue> {
        self.queue.iter()
    }

    pub fn last_value(&self) -> Option<&DataValue> {
        self.last_value.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn has_sampling_timer(&self) -> bool {
        self.sampling_timer
            .as_ref()
            .is_some_and(TimerHandle::is_active)
    }

    /// Whether the owning subscription should collect this item's queue.
    pub fn has_notifications(&self) -> bool {
        self.settings.monitoring_mode == MonitoringMode::Reporting && !self.queue.is_empty()
    }

    pub(crate) fn attach_sampling_timer(&mut self, timer: TimerHandle) {
        if self.terminated {
            return;
        }
        self.sampling_timer = Some(timer);
    }

    pub(crate) fn detach_sampling_timer(&mut self) {
        if let Some(mut timer) = self.sampling_timer.take() {
            timer.cancel();
        }
    }

    pub(crate) fn sampling_event(&self, subscription_id: u32) -> SamplingEvent {
        SamplingEvent {
            handle: MonitoredItemHandle {
                subscription_id,
                monitored_item_id: self.monitored_item_id,
            },
            item_to_monitor: self.settings.item_to_monitor.clone(),
            previous_value: self.last_value.clone(),
        }
    }

    /// Queues `value`, stamping absent timestamps with `now`.
    ///
    /// Ignored while disabled or after termination. Returns whether the
    /// value was queued.
    pub fn record_value(&mut self, mut value: DataValue, now: DateTime<Utc>) -> bool {
        if self.terminated || self.settings.monitoring_mode == MonitoringMode::Disabled {
            return false;
        }
        value.stamp_missing(now);
        self.last_value = Some(value.clone());

        if self.queue.len() < self.settings.queue_size {
            self.queue.push_back(value);
            return true;
        }

        self.overflow = true;
        debug!(
            event = events::MONITORED_ITEM_OVERFLOW,
            component = COMPONENT,
            monitored_item_id = self.monitored_item_id,
            queue_size = self.settings.queue_size,
            discard_oldest = self.settings.discard_oldest,
            "monitored item queue overflow"
        );
        if self.settings.discard_oldest {
            self.queue.pop_front();
            self.queue.push_back(value);
            true
        } else {
            false
        }
    }

    /// Drains the queue in insertion order and clears the overflow flag.
    pub fn extract_monitored_item_notifications(&mut self) -> Vec<MonitoredItemNotification> {
        self.overflow = false;
        let client_handle = self.settings.client_handle;
        let timestamps_to_return = self.settings.timestamps_to_return;
        self.queue
            .drain(..)
            .map(|value| MonitoredItemNotification {
                client_handle,
                value: value.filtered(timestamps_to_return),
            })
            .collect()
    }

    /// Switching to `Disabled` discards whatever is queued.
    pub fn set_monitoring_mode(&mut self, monitoring_mode: MonitoringMode) {
        self.settings.monitoring_mode = monitoring_mode;
        if monitoring_mode == MonitoringMode::Disabled {
            self.queue.clear();
            self.overflow = false;
        }
    }

    /// Cancels the sampling timer and drops queued values. Idempotent.
    pub fn terminate(&mut self) {
        if let Some(mut timer) = self.sampling_timer.take() {
            timer.cancel();
        }
        if !self.terminated {
            self.terminated = true;
            self.queue.clear();
        }
    }
}

impl Drop for MonitoredItem {
    fn drop(&mut self) {
        self.terminate();
    }
}
