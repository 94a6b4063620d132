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

//! Subscription state machine: publishing cycles, keep-alive and lifetime
//! counters, and the retransmission queue.
//!
//! A [`Subscription`] never talks to clients itself. Each call that may
//! produce output returns [`SubscriptionEvent`]s which the owning publish
//! engine pairs with queued Publish requests. Callers tell the subscription
//! how many requests are waiting so it can tell "ready" from "late".

mod retransmission;
mod revise;

pub use revise::SubscriptionParameters;
pub(crate) use revise::{revise_queue_size, revise_sampling_interval};

use crate::clock::{Clock, TimerHandle};
use crate::config::SubscriptionLimits;
use crate::error::ConfigError;
use crate::monitored_item::{MonitoredItem, MonitoredItemSettings};
use crate::observability::{events, fields};
use crate::sequence::SequenceNumberGenerator;
use crate::status::StatusCode;
use crate::types::{
    DataChangeNotification, DataValue, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoringMode, NotificationData, NotificationMessage, TimestampsToReturn,
};
use retransmission::RetransmissionQueue;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn, Level};

const COMPONENT: &str = "subscription";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Created, first publishing cycle not run yet.
    Creating,
    Normal,
    /// Has a message or keep-alive ready but no Publish request to carry it.
    Late,
    Closing,
    Terminated,
}

/// Output of a subscription for its publish engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionEvent {
    /// A sequenced message; it is already in the retransmission queue.
    Notification {
        message: NotificationMessage,
        more_notifications: bool,
        available_sequence_numbers: Vec<u32>,
    },
    KeepAlive {
        message: NotificationMessage,
        available_sequence_numbers: Vec<u32>,
    },
    /// The lifetime counter ran out; `status_change` tells the client.
    Expired { status_change: NotificationMessage },
    /// Terminal; carries the ids of the items torn down with it.
    Terminated { monitored_item_ids: Vec<u32> },
}

pub struct Subscription {
    subscription_id: u32,
    parameters: SubscriptionParameters,
    limits: SubscriptionLimits,
    clock: Arc<dyn Clock>,
    state: SubscriptionState,
    keep_alive_counter: u32,
    lifetime_counter: u32,
    // No message or keep-alive delivered yet; the first cycle answers at once.
    message_sent: bool,
    keep_alive_pending: bool,
    monitored_items: BTreeMap<u32, MonitoredItem>,
    next_monitored_item_id: u32,
    pending_notifications: VecDeque<Vec<NotificationData>>,
    retransmission: RetransmissionQueue,
    sequence_numbers: SequenceNumberGenerator,
    publishing_timer: Option<TimerHandle>,
}

impl Subscription {
    /// Builds a subscription from already revised parameters.
    pub fn new(
        subscription_id: u32,
        parameters: SubscriptionParameters,
        limits: SubscriptionLimits,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        validate_parameters(&parameters)?;
        Ok(Self {
            subscription_id,
            keep_alive_counter: parameters.max_keep_alive_count,
            lifetime_counter: parameters.lifetime_count,
            parameters,
            limits,
            clock,
            state: SubscriptionState::Creating,
            message_sent: false,
            keep_alive_pending: false,
            monitored_items: BTreeMap::new(),
            next_monitored_item_id: 1,
            pending_notifications: VecDeque::new(),
            retransmission: RetransmissionQueue::default(),
            sequence_numbers: SequenceNumberGenerator::new(),
            publishing_timer: None,
        })
    }

    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    pub fn parameters(&self) -> &SubscriptionParameters {
        &self.parameters
    }

    pub fn publishing_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.parameters.publishing_interval / 1000.0)
            .unwrap_or(Duration::MAX)
    }

    pub fn priority(&self) -> u8 {
        self.parameters.priority
    }

    pub fn publishing_enabled(&self) -> bool {
        self.parameters.publishing_enabled
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SubscriptionState::Terminated
    }

    pub fn keep_alive_counter(&self) -> u32 {
        self.keep_alive_counter
    }

    pub fn lifetime_counter(&self) -> u32 {
        self.lifetime_counter
    }

    pub fn pending_notifications_count(&self) -> usize {
        self.pending_notifications.len()
    }

    pub fn sent_notifications_count(&self) -> usize {
        self.retransmission.len()
    }

    /// Sequence numbers of sent messages not yet acknowledged or purged.
    pub fn available_sequence_numbers(&self) -> Vec<u32> {
        self.retransmission.available_sequence_numbers()
    }

    /// Whether a Publish request arriving now would be answered at once.
    pub fn has_ready_output(&self) -> bool {
        !self.is_terminated()
            && ((self.parameters.publishing_enabled && !self.pending_notifications.is_empty())
                || self.keep_alive_pending)
    }

    pub fn monitored_item(&self, monitored_item_id: u32) -> Option<&MonitoredItem> {
        self.monitored_items.get(&monitored_item_id)
    }

    pub(crate) fn monitored_item_mut(&mut self, monitored_item_id: u32) -> Option<&mut MonitoredItem> {
        self.monitored_items.get_mut(&monitored_item_id)
    }

    pub fn monitored_items(&self) -> impl Iterator<Item = &MonitoredItem> {
        self.monitored_items.values()
    }

    pub fn monitored_item_count(&self) -> usize {
        self.monitored_items.len()
    }

    pub(crate) fn attach_publishing_timer(&mut self, timer: TimerHandle) {
        if self.is_terminated() {
            return;
        }
        self.publishing_timer = Some(timer);
    }

    /// Cancels the publishing and sampling timers, e.g. before the
    /// subscription moves to another engine.
    pub(crate) fn detach_timers(&mut self) {
        if let Some(mut timer) = self.publishing_timer.take() {
            timer.cancel();
        }
        for item in self.monitored_items.values_mut() {
            item.detach_sampling_timer();
        }
    }

    /// Resets the lifetime counter. Any Publish request, acknowledgement or
    /// other client call on the subscription counts as a ping.
    pub fn ping_from_client(&mut self) {
        self.lifetime_counter = self.parameters.lifetime_count;
    }

    /// Queues a batch of notifications for the next cycle.
    ///
    /// Beyond the configured backlog the oldest unsent batch is dropped.
    pub fn add_notification_message(&mut self, notification_data: Vec<NotificationData>) {
        if self.is_terminated() || notification_data.is_empty() {
            return;
        }
        self.pending_notifications.push_back(notification_data);

        let max_pending = self.limits.max_pending_notifications;
        while max_pending != 0 && self.pending_notifications.len() > max_pending {
            self.pending_notifications.pop_front();
            warn!(
                event = events::NOTIFICATION_DROPPED,
                component = COMPONENT,
                subscription_id = self.subscription_id,
                max_pending,
                "dropping oldest unsent notification message"
            );
        }
    }

    /// Runs one publishing cycle with `available_publish_requests` Publish
    /// requests waiting in the engine.
    pub fn publishing_cycle(&mut self, available_publish_requests: usize) -> Vec<SubscriptionEvent> {
        if matches!(
            self.state,
            SubscriptionState::Closing | SubscriptionState::Terminated
        ) {
            return Vec::new();
        }

        self.purge_retransmission_queue();
        if self.parameters.publishing_enabled {
            self.collect_notifications();
        }

        let mut events = self.flush(available_publish_requests);
        if events.is_empty() && !self.has_ready_output() {
            if self.message_sent {
                self.keep_alive_counter = self.keep_alive_counter.saturating_sub(1);
            }
            if !self.message_sent || self.keep_alive_counter == 0 {
                self.keep_alive_pending = true;
                events = self.flush(available_publish_requests);
            }
        }

        if self.has_ready_output() && self.state != SubscriptionState::Late {
            debug!(
                event = events::SUBSCRIPTION_LATE,
                component = COMPONENT,
                subscription_id = self.subscription_id,
                pending = self.pending_notifications.len(),
                keep_alive_pending = self.keep_alive_pending,
                "subscription is late; no publish request available"
            );
            self.state = SubscriptionState::Late;
        } else if !self.has_ready_output() {
            self.state = SubscriptionState::Normal;
        }

        self.lifetime_counter = self.lifetime_counter.saturating_sub(1);
        if self.lifetime_counter == 0 {
            warn!(
                event = events::SUBSCRIPTION_EXPIRED,
                component = COMPONENT,
                subscription_id = self.subscription_id,
                lifetime_count = self.parameters.lifetime_count,
                "subscription lifetime expired"
            );
            events.push(SubscriptionEvent::Expired {
                status_change: self.status_change_notice(StatusCode::BadTimeout),
            });
            let monitored_item_ids = self.terminate();
            events.push(SubscriptionEvent::Terminated { monitored_item_ids });
        }

        events
    }

    /// Serves whatever is ready with up to `available_publish_requests`
    /// Publish requests; used when a request arrives between cycles.
    pub fn on_publish_request_available(
        &mut self,
        available_publish_requests: usize,
    ) -> Vec<SubscriptionEvent> {
        let events = self.flush(available_publish_requests);
        if self.state == SubscriptionState::Late && !self.has_ready_output() {
            self.state = SubscriptionState::Normal;
        }
        events
    }

    fn flush(&mut self, available_publish_requests: usize) -> Vec<SubscriptionEvent> {
        let mut events = Vec::new();
        if self.is_terminated() {
            return events;
        }

        let mut available = available_publish_requests;
        while available > 0 && self.parameters.publishing_enabled {
            let Some(notification_data) = self.pending_notifications.pop_front() else {
                break;
            };
            events.push(self.send_notification(notification_data));
            available -= 1;
        }

        if !events.is_empty() {
            self.keep_alive_pending = false;
            self.keep_alive_counter = self.parameters.max_keep_alive_count;
            self.lifetime_counter = self.parameters.lifetime_count;
        } else if self.keep_alive_pending && available > 0 {
            events.push(self.send_keep_alive());
        }
        events
    }

    fn send_notification(&mut self, notification_data: Vec<NotificationData>) -> SubscriptionEvent {
        let sequence_number = self.sequence_numbers.next_value();
        let message = NotificationMessage {
            sequence_number,
            publish_time: self.clock.utc_now(),
            notification_data,
        };
        self.retransmission.push(message.clone(), self.clock.now());
        self.message_sent = true;

        debug!(
            event = events::SUBSCRIPTION_NOTIFICATION,
            component = COMPONENT,
            subscription_id = self.subscription_id,
            sequence_number,
            notifications = message.notification_count(),
            "notification message ready"
        );

        SubscriptionEvent::Notification {
            message,
            more_notifications: !self.pending_notifications.is_empty(),
            available_sequence_numbers: self.retransmission.available_sequence_numbers(),
        }
    }

    fn send_keep_alive(&mut self) -> SubscriptionEvent {
        self.keep_alive_pending = false;
        self.keep_alive_counter = self.parameters.max_keep_alive_count;
        self.message_sent = true;

        let message = NotificationMessage::keep_alive(
            self.sequence_numbers.future_value(),
            self.clock.utc_now(),
        );
        trace!(
            event = events::SUBSCRIPTION_KEEPALIVE,
            component = COMPONENT,
            subscription_id = self.subscription_id,
            sequence_number = message.sequence_number,
            "keep-alive ready"
        );

        SubscriptionEvent::KeepAlive {
            message,
            available_sequence_numbers: self.retransmission.available_sequence_numbers(),
        }
    }

    fn keep_alive_interval(&self) -> Duration {
        self.publishing_interval()
            .checked_mul(self.parameters.max_keep_alive_count)
            .unwrap_or(Duration::MAX)
    }

    fn purge_retransmission_queue(&mut self) {
        let purged = self
            .retransmission
            .purge_older_than(self.clock.now(), self.keep_alive_interval());
        if !purged.is_empty() && tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::RETRANSMISSION_PURGED,
                component = COMPONENT,
                subscription_id = self.subscription_id,
                sequence_numbers = fields::format_sequence_numbers(&purged).as_str(),
                "purged unacknowledged notification messages"
            );
        }
    }

    fn collect_notifications(&mut self) {
        let notifications: Vec<_> = self
            .monitored_items
            .values_mut()
            .filter(|item| item.has_notifications())
            .flat_map(MonitoredItem::extract_monitored_item_notifications)
            .collect();
        if notifications.is_empty() {
            return;
        }

        let chunk_size = match self.parameters.max_notifications_per_publish {
            0 => notifications.len(),
            max => max as usize,
        };
        let batches: Vec<Vec<NotificationData>> = notifications
            .chunks(chunk_size)
            .map(|chunk| {
                vec![NotificationData::DataChange(DataChangeNotification {
                    monitored_items: chunk.to_vec(),
                })]
            })
            .collect();
        for batch in batches {
            self.add_notification_message(batch);
        }
    }

    /// Removes an acknowledged message from the retransmission queue.
    pub fn acknowledge_notification(&mut self, sequence_number: u32) -> StatusCode {
        if self.retransmission.acknowledge(sequence_number) {
            StatusCode::Good
        } else {
            StatusCode::BadSequenceNumberUnknown
        }
    }

    /// A retained message by sequence number.
    pub fn republish(&self, sequence_number: u32) -> Result<NotificationMessage, StatusCode> {
        self.retransmission
            .get(sequence_number)
            .cloned()
            .ok_or(StatusCode::BadMessageNotAvailable)
    }

    /// A status-change message numbered with the next unused sequence number.
    pub(crate) fn status_change_notice(&self, status: StatusCode) -> NotificationMessage {
        NotificationMessage::status_change(
            self.sequence_numbers.future_value(),
            self.clock.utc_now(),
            status,
        )
    }

    /// Applies revised parameters and restarts both counters. The caller
    /// re-arms the publishing timer when the interval changed.
    pub fn modify(&mut self, parameters: SubscriptionParameters) -> Result<(), ConfigError> {
        validate_parameters(&parameters)?;
        self.parameters = parameters;
        self.keep_alive_counter = self.parameters.max_keep_alive_count;
        self.lifetime_counter = self.parameters.lifetime_count;
        info!(
            event = events::SUBSCRIPTION_MODIFIED,
            component = COMPONENT,
            subscription_id = self.subscription_id,
            publishing_interval_ms = self.parameters.publishing_interval,
            lifetime_count = self.parameters.lifetime_count,
            max_keep_alive_count = self.parameters.max_keep_alive_count,
            "subscription modified"
        );
        Ok(())
    }

    pub fn set_publishing_enabled(&mut self, publishing_enabled: bool) {
        self.parameters.publishing_enabled = publishing_enabled;
    }

    /// Prepares the subscription for a new owner. Without
    /// `keep_old_notifications` unsent and unacknowledged messages are dropped.
    pub(crate) fn prepare_transfer(&mut self, keep_old_notifications: bool) {
        self.detach_timers();
        if keep_old_notifications {
            self.retransmission.restamp(self.clock.now());
        } else {
            self.retransmission.clear();
            self.pending_notifications.clear();
        }
        self.ping_from_client();
        self.keep_alive_counter = self.parameters.max_keep_alive_count;
        // The new session hears from the subscription on its first cycle.
        self.message_sent = false;
        self.keep_alive_pending = false;
        self.state = SubscriptionState::Normal;
    }

    /// Creates a monitored item from a request whose target the node manager
    /// already accepted. The caller arms the sampling timer.
    pub fn create_monitored_item(
        &mut self,
        timestamps_to_return: TimestampsToReturn,
        request: &MonitoredItemCreateRequest,
    ) -> MonitoredItemCreateResult {
        if self.is_terminated() {
            return MonitoredItemCreateResult::failed(StatusCode::BadSubscriptionIdInvalid);
        }
        let max_items = self.limits.max_monitored_items_per_subscription;
        if max_items != 0 && self.monitored_items.len() >= max_items {
            return MonitoredItemCreateResult::failed(StatusCode::BadTooManyMonitoredItems);
        }

        let parameters = &request.requested_parameters;
        let revised_sampling_interval = revise_sampling_interval(
            parameters.sampling_interval,
            self.parameters.publishing_interval,
            &self.limits,
        );
        let revised_queue_size = revise_queue_size(parameters.queue_size, &self.limits);
        let settings = MonitoredItemSettings {
            client_handle: parameters.client_handle,
            item_to_monitor: request.item_to_monitor.clone(),
            monitoring_mode: request.monitoring_mode,
            sampling_interval: revised_sampling_interval,
            queue_size: revised_queue_size as usize,
            discard_oldest: parameters.discard_oldest,
            timestamps_to_return,
        };

        let monitored_item_id = self.unused_monitored_item_id();
        let item = match MonitoredItem::new(monitored_item_id, settings) {
            Ok(item) => item,
            Err(err) => {
                warn!(
                    event = events::MONITORED_ITEM_REJECTED,
                    component = COMPONENT,
                    subscription_id = self.subscription_id,
                    err = %err,
                    "rejected monitored item"
                );
                return MonitoredItemCreateResult::failed(StatusCode::BadInvalidArgument);
            }
        };
        self.next_monitored_item_id = monitored_item_id.wrapping_add(1).max(1);
        self.monitored_items.insert(monitored_item_id, item);

        debug!(
            event = events::MONITORED_ITEM_CREATED,
            component = COMPONENT,
            subscription_id = self.subscription_id,
            monitored_item_id,
            sampling_interval_ms = revised_sampling_interval,
            queue_size = revised_queue_size,
            "monitored item created"
        );

        MonitoredItemCreateResult {
            status_code: StatusCode::Good,
            monitored_item_id,
            revised_sampling_interval,
            revised_queue_size,
        }
    }

    // First id from `next_monitored_item_id` on that no live item holds,
    // skipping 0 after wraparound.
    fn unused_monitored_item_id(&self) -> u32 {
        let mut candidate = self.next_monitored_item_id.max(1);
        while self.monitored_items.contains_key(&candidate) {
            candidate = candidate.wrapping_add(1).max(1);
        }
        candidate
    }

    pub fn set_monitoring_mode(
        &mut self,
        monitored_item_id: u32,
        monitoring_mode: MonitoringMode,
    ) -> StatusCode {
        match self.monitored_items.get_mut(&monitored_item_id) {
            Some(item) => {
                item.set_monitoring_mode(monitoring_mode);
                StatusCode::Good
            }
            None => StatusCode::BadMonitoredItemIdInvalid,
        }
    }

    /// Terminates and removes one item.
    pub fn delete_monitored_item(&mut self, monitored_item_id: u32) -> StatusCode {
        match self.monitored_items.remove(&monitored_item_id) {
            Some(mut item) => {
                item.terminate();
                debug!(
                    event = events::MONITORED_ITEM_DELETED,
                    component = COMPONENT,
                    subscription_id = self.subscription_id,
                    monitored_item_id,
                    "monitored item deleted"
                );
                StatusCode::Good
            }
            None => StatusCode::BadMonitoredItemIdInvalid,
        }
    }

    /// Records a value for one item, timestamped by the subscription clock.
    pub fn record_value(&mut self, monitored_item_id: u32, value: DataValue) -> StatusCode {
        let now = self.clock.utc_now();
        match self.monitored_items.get_mut(&monitored_item_id) {
            Some(item) => {
                item.record_value(value, now);
                StatusCode::Good
            }
            None => StatusCode::BadMonitoredItemIdInvalid,
        }
    }

    /// Terminates every monitored item, then the subscription itself.
    ///
    /// Idempotent; returns the ids of the items torn down by this call.
    pub fn terminate(&mut self) -> Vec<u32> {
        if self.is_terminated() {
            return Vec::new();
        }
        self.state = SubscriptionState::Closing;

        let monitored_item_ids: Vec<u32> = self.monitored_items.keys().copied().collect();
        for item in self.monitored_items.values_mut() {
            item.terminate();
        }
        self.monitored_items.clear();

        if let Some(mut timer) = self.publishing_timer.take() {
            timer.cancel();
        }
        self.pending_notifications.clear();
        self.retransmission.clear();
        self.keep_alive_pending = false;
        self.state = SubscriptionState::Terminated;

        info!(
            event = events::SUBSCRIPTION_TERMINATED,
            component = COMPONENT,
            subscription_id = self.subscription_id,
            monitored_items = monitored_item_ids.len(),
            "subscription terminated"
        );
        monitored_item_ids
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_timers();
    }
}

fn validate_parameters(parameters: &SubscriptionParameters) -> Result<(), ConfigError> {
    if !parameters.publishing_interval.is_finite() || parameters.publishing_interval <= 0.0 {
        return Err(ConfigError::InvalidPublishingInterval(
            parameters.publishing_interval,
        ));
    }
    if parameters.max_keep_alive_count == 0 {
        return Err(ConfigError::ZeroKeepAliveCount);
    }
    if u64::from(parameters.lifetime_count) < 3 * u64::from(parameters.max_keep_alive_count) {
        return Err(ConfigError::LifetimeTooShort {
            lifetime: parameters.lifetime_count,
            keep_alive: parameters.max_keep_alive_count,
        });
    }
    Ok(())
}
