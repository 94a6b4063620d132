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

//! Per-session matching of Publish requests against subscription output.
//!
//! The engine parks incoming Publish requests in one FIFO shared by all of
//! the session's subscriptions. Whenever a subscription produces a message
//! or keep-alive, the oldest waiting request carries it, whichever
//! subscription the client had in mind when sending it.

mod pending;

use crate::clock::{Clock, TimerHandle};
use crate::config::SubscriptionLimits;
use crate::continuation::{ContinuationPoint, ContinuationPointManager, Page};
use crate::error::ConfigError;
use crate::node_manager::NodeManager;
use crate::observability::{events, fields};
use crate::status::StatusCode;
use crate::subscription::{Subscription, SubscriptionEvent, SubscriptionParameters};
use crate::types::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DataValue, DeleteMonitoredItemsRequest,
    DeleteMonitoredItemsResponse, DeleteSubscriptionsRequest, DeleteSubscriptionsResponse,
    ModifySubscriptionRequest, ModifySubscriptionResponse, MonitoredItemCreateResult,
    MonitoredItemHandle, MonitoringMode, NotificationMessage, PublishRequest, PublishResult,
    ReadValueId, RepublishRequest, RepublishResponse, SetMonitoringModeRequest,
    SetMonitoringModeResponse, SetPublishingModeRequest, SetPublishingModeResponse,
};
use pending::{fault_immediately, PendingPublishRequest};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn, Level};

const COMPONENT: &str = "publish_engine";
const ENGINE_EVENT_CAPACITY: usize = 256;

/// Hands out subscription ids; share one allocator between engines that may
/// transfer subscriptions to each other.
#[derive(Debug)]
pub struct SubscriptionIdAllocator {
    next: AtomicU32,
}

impl Default for SubscriptionIdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }
}

impl SubscriptionIdAllocator {
    /// Next id; 0 is skipped on wraparound.
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

/// Observer view of what the engine did; clients never depend on it.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Notification {
        session_id: u32,
        subscription_id: u32,
        sequence_number: u32,
    },
    KeepAlive {
        session_id: u32,
        subscription_id: u32,
        sequence_number: u32,
    },
    Expired {
        session_id: u32,
        subscription_id: u32,
    },
    Terminated {
        session_id: u32,
        subscription_id: u32,
    },
    Transferred {
        subscription_id: u32,
        from_session_id: u32,
        to_session_id: u32,
    },
    PublishRejected {
        session_id: u32,
        request_handle: u32,
        status: StatusCode,
    },
}

/// One row of a paged monitored-item listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemSummary {
    pub monitored_item_id: u32,
    pub client_handle: u32,
}

// A status-change message owed to the session's next Publish request.
struct StatusNotice {
    subscription_id: u32,
    message: NotificationMessage,
}

#[derive(Default)]
struct EngineState {
    subscriptions: HashMap<u32, Subscription>,
    pending_requests: VecDeque<PendingPublishRequest>,
    status_notices: VecDeque<StatusNotice>,
    closed: bool,
}

/// Owns the subscriptions of one session and answers its Publish requests.
pub struct ServerSidePublishEngine {
    session_id: u32,
    limits: SubscriptionLimits,
    clock: Arc<dyn Clock>,
    node_manager: Arc<dyn NodeManager>,
    subscription_ids: Arc<SubscriptionIdAllocator>,
    continuation_points: ContinuationPointManager<MonitoredItemSummary>,
    events: broadcast::Sender<EngineEvent>,
    state: Mutex<EngineState>,
    weak_self: Weak<ServerSidePublishEngine>,
}

impl ServerSidePublishEngine {
    pub fn new(
        session_id: u32,
        limits: SubscriptionLimits,
        clock: Arc<dyn Clock>,
        node_manager: Arc<dyn NodeManager>,
        subscription_ids: Arc<SubscriptionIdAllocator>,
    ) -> Result<Arc<Self>, ConfigError> {
        limits.validate()?;
        let (events, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        Ok(Arc::new_cyclic(|weak_self| Self {
            session_id,
            continuation_points: ContinuationPointManager::new(limits.max_continuation_points),
            limits,
            clock,
            node_manager,
            subscription_ids,
            events,
            state: Mutex::new(EngineState::default()),
            weak_self: weak_self.clone(),
        }))
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn limits(&self) -> &SubscriptionLimits {
        &self.limits
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    pub fn subscription_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.state().subscriptions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn pending_publish_request_count(&self) -> usize {
        self.state().pending_requests.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Runs `inspect` against one subscription under the engine lock.
    pub fn inspect_subscription<R>(
        &self,
        subscription_id: u32,
        inspect: impl FnOnce(&Subscription) -> R,
    ) -> Option<R> {
        self.state().subscriptions.get(&subscription_id).map(inspect)
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: EngineEvent) {
        // No observers is fine.
        let _ = self.events.send(event);
    }

    pub fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<CreateSubscriptionResponse, StatusCode> {
        let parameters = SubscriptionParameters::revised(request, &self.limits);
        let mut state = self.state();
        if state.closed {
            return Err(StatusCode::BadSessionClosed);
        }
        let max_subscriptions = self.limits.max_subscriptions_per_session;
        if max_subscriptions != 0 && state.subscriptions.len() >= max_subscriptions {
            return Err(StatusCode::BadTooManySubscriptions);
        }

        let subscription_id = self.subscription_ids.next_id();
        let mut subscription = Subscription::new(
            subscription_id,
            parameters.clone(),
            self.limits.clone(),
            self.clock.clone(),
        )
        .map_err(|err| {
            warn!(
                event = events::SUBSCRIPTION_CREATED,
                component = COMPONENT,
                session_id = self.session_id,
                err = %err,
                "revised subscription parameters rejected"
            );
            StatusCode::BadInvalidArgument
        })?;
        self.arm_timers(&mut subscription);
        state.subscriptions.insert(subscription_id, subscription);

        info!(
            event = events::SUBSCRIPTION_CREATED,
            component = COMPONENT,
            session_id = self.session_id,
            subscription_id,
            publishing_interval_ms = parameters.publishing_interval,
            lifetime_count = parameters.lifetime_count,
            max_keep_alive_count = parameters.max_keep_alive_count,
            "subscription created"
        );

        Ok(CreateSubscriptionResponse {
            subscription_id,
            revised_publishing_interval: parameters.publishing_interval,
            revised_lifetime_count: parameters.lifetime_count,
            revised_max_keep_alive_count: parameters.max_keep_alive_count,
        })
    }

    /// Registers a subscription built elsewhere and arms its timers.
    pub fn add_subscription(&self, mut subscription: Subscription) -> Result<u32, StatusCode> {
        let subscription_id = subscription.subscription_id();
        let mut state = self.state();
        if state.closed {
            return Err(StatusCode::BadSessionClosed);
        }
        if subscription.is_terminated() || state.subscriptions.contains_key(&subscription_id) {
            return Err(StatusCode::BadSubscriptionIdInvalid);
        }
        let max_subscriptions = self.limits.max_subscriptions_per_session;
        if max_subscriptions != 0 && state.subscriptions.len() >= max_subscriptions {
            return Err(StatusCode::BadTooManySubscriptions);
        }

        self.arm_timers(&mut subscription);
        state.subscriptions.insert(subscription_id, subscription);
        self.serve_ready_subscriptions(&mut state);
        Ok(subscription_id)
    }

    fn arm_timers(&self, subscription: &mut Subscription) {
        let subscription_id = subscription.subscription_id();
        let timer = self.schedule(subscription.publishing_interval(), move |engine| {
            engine.on_publishing_timer(subscription_id)
        });
        subscription.attach_publishing_timer(timer);

        let sampled: Vec<(u32, f64)> = subscription
            .monitored_items()
            .map(|item| (item.monitored_item_id(), item.sampling_interval()))
            .collect();
        for (monitored_item_id, sampling_interval) in sampled {
            self.arm_sampling_timer(subscription, monitored_item_id, sampling_interval);
        }
    }

    fn arm_sampling_timer(
        &self,
        subscription: &mut Subscription,
        monitored_item_id: u32,
        sampling_interval: f64,
    ) {
        if sampling_interval <= 0.0 {
            return;
        }
        let subscription_id = subscription.subscription_id();
        let period =
            Duration::try_from_secs_f64(sampling_interval / 1000.0).unwrap_or(Duration::MAX);
        let timer = self.schedule(period, move |engine| {
            engine.on_sampling_timer(subscription_id, monitored_item_id)
        });
        if let Some(item) = subscription.monitored_item_mut(monitored_item_id) {
            item.attach_sampling_timer(timer);
        }
    }

    fn schedule(
        &self,
        period: Duration,
        on_tick: impl Fn(&ServerSidePublishEngine) + Send + 'static,
    ) -> TimerHandle {
        let engine = self.weak_self.clone();
        TimerHandle::schedule(
            &self.clock,
            period,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    on_tick(&engine);
                }
            }),
        )
    }

    /// Publishing timer callback: runs one cycle of `subscription_id`.
    pub fn on_publishing_timer(&self, subscription_id: u32) {
        let released = {
            let mut state = self.state();
            self.prune_requests(&mut state);
            let available = state.pending_requests.len();
            let Some(subscription) = state.subscriptions.get_mut(&subscription_id) else {
                return;
            };
            let cycle_events = subscription.publishing_cycle(available);
            let released = self.dispatch(&mut state, subscription_id, cycle_events);
            self.settle(&mut state);
            released
        };
        self.unregister(released);
    }

    /// Sampling timer callback: asks the node manager for a value to record.
    pub fn on_sampling_timer(&self, subscription_id: u32, monitored_item_id: u32) {
        let sampling_event = {
            let state = self.state();
            let Some(item) = state
                .subscriptions
                .get(&subscription_id)
                .and_then(|subscription| subscription.monitored_item(monitored_item_id))
            else {
                return;
            };
            if item.is_terminated() || item.monitoring_mode() == MonitoringMode::Disabled {
                return;
            }
            item.sampling_event(subscription_id)
        };

        let Some(value) = self.node_manager.on_sampling(&sampling_event) else {
            return;
        };
        if let Some(subscription) = self.state().subscriptions.get_mut(&subscription_id) {
            subscription.record_value(monitored_item_id, value);
        }
    }

    /// Push-model entry point for node managers reporting a change.
    pub fn notify_data_change(&self, handle: MonitoredItemHandle, value: DataValue) -> StatusCode {
        match self.state().subscriptions.get_mut(&handle.subscription_id) {
            Some(subscription) => subscription.record_value(handle.monitored_item_id, value),
            None => StatusCode::BadSubscriptionIdInvalid,
        }
    }

    /// Accepts a Publish request; the receiver resolves once a subscription
    /// has something for it, or with a fault.
    pub fn on_publish_request(&self, request: PublishRequest) -> oneshot::Receiver<PublishResult> {
        let (responder, receiver) = oneshot::channel();
        let request_handle = request.request_handle;
        let mut state = self.state();

        if state.closed {
            fault_immediately(responder, request_handle, StatusCode::BadSessionClosed);
            return receiver;
        }
        self.prune_requests(&mut state);

        let acknowledgement_results: Vec<StatusCode> = request
            .subscription_acknowledgements
            .iter()
            .map(|ack| match state.subscriptions.get_mut(&ack.subscription_id) {
                Some(subscription) => subscription.acknowledge_notification(ack.sequence_number),
                None => StatusCode::BadSubscriptionIdInvalid,
            })
            .collect();
        if !acknowledgement_results.is_empty() && tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::PUBLISH_ACK_RESULT,
                component = COMPONENT,
                session_id = self.session_id,
                request_handle,
                results = ?acknowledgement_results,
                "processed acknowledgements"
            );
        }
        for subscription in state.subscriptions.values_mut() {
            subscription.ping_from_client();
        }

        let pending = PendingPublishRequest::new(
            &request,
            acknowledgement_results,
            self.clock.now(),
            responder,
        );

        if let Some(notice) = state.status_notices.pop_front() {
            self.deliver(pending, notice.subscription_id, notice.message, false, Vec::new());
            return receiver;
        }

        if state.subscriptions.is_empty() {
            self.fault(pending, StatusCode::BadNoSubscription);
            return receiver;
        }

        if state.pending_requests.len() >= self.limits.max_pending_publish_requests {
            warn!(
                event = events::PUBLISH_REQUEST_REJECTED,
                component = COMPONENT,
                session_id = self.session_id,
                request_handle,
                pending = state.pending_requests.len(),
                reason = fields::REASON_QUEUE_FULL,
                "too many publish requests"
            );
            self.emit(EngineEvent::PublishRejected {
                session_id: self.session_id,
                request_handle,
                status: StatusCode::BadTooManyPublishRequests,
            });
            self.fault(pending, StatusCode::BadTooManyPublishRequests);
            return receiver;
        }

        state.pending_requests.push_back(pending);
        debug!(
            event = events::PUBLISH_REQUEST_QUEUED,
            component = COMPONENT,
            session_id = self.session_id,
            request_handle,
            pending = state.pending_requests.len(),
            "publish request queued"
        );

        self.serve_ready_subscriptions(&mut state);
        receiver
    }

    // Late subscriptions are served by priority, then by id.
    fn serve_ready_subscriptions(&self, state: &mut EngineState) {
        let mut ready: Vec<(u8, u32)> = state
            .subscriptions
            .values()
            .filter(|subscription| subscription.has_ready_output())
            .map(|subscription| (subscription.priority(), subscription.subscription_id()))
            .collect();
        ready.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, subscription_id) in ready {
            let available = state.pending_requests.len();
            if available == 0 {
                break;
            }
            let Some(subscription) = state.subscriptions.get_mut(&subscription_id) else {
                continue;
            };
            let ready_events = subscription.on_publish_request_available(available);
            // Serving never terminates a subscription, so nothing is released.
            let _ = self.dispatch(state, subscription_id, ready_events);
        }
    }

    /// Pairs subscription output with the oldest waiting requests. Returns
    /// the monitored items of terminated subscriptions.
    fn dispatch(
        &self,
        state: &mut EngineState,
        subscription_id: u32,
        subscription_events: Vec<SubscriptionEvent>,
    ) -> Vec<MonitoredItemHandle> {
        let mut released = Vec::new();
        for subscription_event in subscription_events {
            match subscription_event {
                SubscriptionEvent::Notification {
                    message,
                    more_notifications,
                    available_sequence_numbers,
                } => {
                    self.emit(EngineEvent::Notification {
                        session_id: self.session_id,
                        subscription_id,
                        sequence_number: message.sequence_number,
                    });
                    self.deliver_to_oldest(
                        state,
                        subscription_id,
                        message,
                        more_notifications,
                        available_sequence_numbers,
                    );
                }
                SubscriptionEvent::KeepAlive {
                    message,
                    available_sequence_numbers,
                } => {
                    self.emit(EngineEvent::KeepAlive {
                        session_id: self.session_id,
                        subscription_id,
                        sequence_number: message.sequence_number,
                    });
                    self.deliver_to_oldest(
                        state,
                        subscription_id,
                        message,
                        false,
                        available_sequence_numbers,
                    );
                }
                SubscriptionEvent::Expired { status_change } => {
                    self.emit(EngineEvent::Expired {
                        session_id: self.session_id,
                        subscription_id,
                    });
                    state.status_notices.push_back(StatusNotice {
                        subscription_id,
                        message: status_change,
                    });
                }
                SubscriptionEvent::Terminated { monitored_item_ids } => {
                    state.subscriptions.remove(&subscription_id);
                    self.emit(EngineEvent::Terminated {
                        session_id: self.session_id,
                        subscription_id,
                    });
                    released.extend(monitored_item_ids.into_iter().map(|monitored_item_id| {
                        MonitoredItemHandle {
                            subscription_id,
                            monitored_item_id,
                        }
                    }));
                }
            }
        }
        released
    }

    fn deliver_to_oldest(
        &self,
        state: &mut EngineState,
        subscription_id: u32,
        message: NotificationMessage,
        more_notifications: bool,
        available_sequence_numbers: Vec<u32>,
    ) {
        match state.pending_requests.pop_front() {
            Some(pending) => self.deliver(
                pending,
                subscription_id,
                message,
                more_notifications,
                available_sequence_numbers,
            ),
            // Only reachable if the caller miscounted available requests; the
            // message stays retransmittable.
            None => warn!(
                event = events::PUBLISH_RESPONSE_DROPPED,
                component = COMPONENT,
                session_id = self.session_id,
                subscription_id,
                sequence_number = message.sequence_number,
                "no publish request for ready message"
            ),
        }
    }

    fn deliver(
        &self,
        pending: PendingPublishRequest,
        subscription_id: u32,
        message: NotificationMessage,
        more_notifications: bool,
        available_sequence_numbers: Vec<u32>,
    ) {
        let request_handle = pending.request_handle();
        let sequence_number = message.sequence_number;
        let kind = tracing::enabled!(Level::DEBUG).then(|| fields::format_message_kind(&message));

        if pending.respond(
            subscription_id,
            message,
            more_notifications,
            available_sequence_numbers,
        ) {
            if let Some(kind) = kind {
                debug!(
                    event = events::PUBLISH_RESPONSE_SENT,
                    component = COMPONENT,
                    session_id = self.session_id,
                    subscription_id,
                    request_handle,
                    sequence_number,
                    kind = kind.as_str(),
                    "publish response sent"
                );
            }
        } else {
            debug!(
                event = events::PUBLISH_RESPONSE_DROPPED,
                component = COMPONENT,
                session_id = self.session_id,
                subscription_id,
                request_handle,
                sequence_number,
                reason = fields::REASON_RECEIVER_GONE,
                "publish response dropped"
            );
        }
    }

    fn fault(&self, pending: PendingPublishRequest, status: StatusCode) {
        let request_handle = pending.request_handle();
        if pending.fault(status) {
            debug!(
                event = events::PUBLISH_FAULT_SENT,
                component = COMPONENT,
                session_id = self.session_id,
                request_handle,
                status = %status,
                "publish request faulted"
            );
        }
    }

    // Drops abandoned requests and times out overdue ones.
    fn prune_requests(&self, state: &mut EngineState) {
        let now = self.clock.now();
        let mut kept = VecDeque::with_capacity(state.pending_requests.len());
        for pending in state.pending_requests.drain(..) {
            if pending.is_abandoned() {
                continue;
            }
            if pending.is_timed_out(now) {
                debug!(
                    event = events::PUBLISH_REQUEST_TIMED_OUT,
                    component = COMPONENT,
                    session_id = self.session_id,
                    request_handle = pending.request_handle(),
                    "publish request timed out"
                );
                self.fault(pending, StatusCode::BadTimeout);
                continue;
            }
            kept.push_back(pending);
        }
        state.pending_requests = kept;
    }

    // Delivers owed status notices, then faults requests that no
    // subscription can ever answer.
    fn settle(&self, state: &mut EngineState) {
        while !state.status_notices.is_empty() {
            let Some(pending) = state.pending_requests.pop_front() else {
                break;
            };
            if let Some(notice) = state.status_notices.pop_front() {
                self.deliver(pending, notice.subscription_id, notice.message, false, Vec::new());
            }
        }

        if state.subscriptions.is_empty() && state.status_notices.is_empty() {
            for pending in state.pending_requests.drain(..) {
                self.fault(pending, StatusCode::BadNoSubscription);
            }
        }
    }

    fn unregister(&self, released: Vec<MonitoredItemHandle>) {
        for handle in released {
            self.node_manager.unregister_monitored_item(handle);
        }
    }

    pub fn modify_subscription(
        &self,
        request: &ModifySubscriptionRequest,
    ) -> Result<ModifySubscriptionResponse, StatusCode> {
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(&request.subscription_id)
            .ok_or(StatusCode::BadSubscriptionIdInvalid)?;

        let previous_interval = subscription.publishing_interval();
        let parameters = subscription
            .parameters()
            .revised_modification(request, &self.limits);
        subscription
            .modify(parameters.clone())
            .map_err(|_| StatusCode::BadInvalidArgument)?;

        if subscription.publishing_interval() != previous_interval {
            let subscription_id = request.subscription_id;
            let timer = self.schedule(subscription.publishing_interval(), move |engine| {
                engine.on_publishing_timer(subscription_id)
            });
            subscription.attach_publishing_timer(timer);
        }

        Ok(ModifySubscriptionResponse {
            revised_publishing_interval: parameters.publishing_interval,
            revised_lifetime_count: parameters.lifetime_count,
            revised_max_keep_alive_count: parameters.max_keep_alive_count,
        })
    }

    pub fn set_publishing_mode(&self, request: &SetPublishingModeRequest) -> SetPublishingModeResponse {
        let mut state = self.state();
        let results: Vec<StatusCode> = request
            .subscription_ids
            .iter()
            .map(|subscription_id| match state.subscriptions.get_mut(subscription_id) {
                Some(subscription) => {
                    subscription.set_publishing_enabled(request.publishing_enabled);
                    subscription.ping_from_client();
                    StatusCode::Good
                }
                None => StatusCode::BadSubscriptionIdInvalid,
            })
            .collect();
        SetPublishingModeResponse { results }
    }

    pub fn delete_subscriptions(&self, request: &DeleteSubscriptionsRequest) -> DeleteSubscriptionsResponse {
        let mut released = Vec::new();
        let results = {
            let mut state = self.state();
            let results: Vec<StatusCode> = request
                .subscription_ids
                .iter()
                .map(|&subscription_id| match state.subscriptions.remove(&subscription_id) {
                    Some(mut subscription) => {
                        released.extend(subscription.terminate().into_iter().map(
                            |monitored_item_id| MonitoredItemHandle {
                                subscription_id,
                                monitored_item_id,
                            },
                        ));
                        info!(
                            event = events::SUBSCRIPTION_DELETED,
                            component = COMPONENT,
                            session_id = self.session_id,
                            subscription_id,
                            "subscription deleted"
                        );
                        self.emit(EngineEvent::Terminated {
                            session_id: self.session_id,
                            subscription_id,
                        });
                        StatusCode::Good
                    }
                    None => StatusCode::BadSubscriptionIdInvalid,
                })
                .collect();
            self.settle(&mut state);
            results
        };
        self.unregister(released);
        DeleteSubscriptionsResponse { results }
    }

    /// Creates monitored items, arms their sampling timers and takes an
    /// initial sample of every item that is not disabled.
    pub fn create_monitored_items(
        &self,
        request: &CreateMonitoredItemsRequest,
    ) -> Result<CreateMonitoredItemsResponse, StatusCode> {
        if request.items_to_create.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let subscription_id = request.subscription_id;
        let validation: Vec<StatusCode> = request
            .items_to_create
            .iter()
            .map(|item| self.node_manager.validate(&item.item_to_monitor))
            .collect();

        let mut created: Vec<(MonitoredItemHandle, ReadValueId, MonitoringMode)> = Vec::new();
        let results: Vec<MonitoredItemCreateResult> = {
            let mut state = self.state();
            let subscription = state
                .subscriptions
                .get_mut(&subscription_id)
                .ok_or(StatusCode::BadSubscriptionIdInvalid)?;
            subscription.ping_from_client();

            request
                .items_to_create
                .iter()
                .zip(validation)
                .map(|(item, validation)| {
                    if validation.is_bad() {
                        return MonitoredItemCreateResult::failed(validation);
                    }
                    let result =
                        subscription.create_monitored_item(request.timestamps_to_return, item);
                    if result.status_code.is_good() {
                        self.arm_sampling_timer(
                            subscription,
                            result.monitored_item_id,
                            result.revised_sampling_interval,
                        );
                        created.push((
                            MonitoredItemHandle {
                                subscription_id,
                                monitored_item_id: result.monitored_item_id,
                            },
                            item.item_to_monitor.clone(),
                            item.monitoring_mode,
                        ));
                    }
                    result
                })
                .collect()
        };

        for (handle, item_to_monitor, monitoring_mode) in created {
            self.node_manager
                .register_monitored_item(handle, &item_to_monitor);
            if monitoring_mode == MonitoringMode::Disabled {
                continue;
            }
            let initial = self
                .node_manager
                .sample_value(&item_to_monitor.node_id, item_to_monitor.attribute_id);
            self.notify_data_change(handle, initial);
        }

        Ok(CreateMonitoredItemsResponse { results })
    }

    pub fn set_monitoring_mode(
        &self,
        request: &SetMonitoringModeRequest,
    ) -> Result<SetMonitoringModeResponse, StatusCode> {
        if request.monitored_item_ids.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(&request.subscription_id)
            .ok_or(StatusCode::BadSubscriptionIdInvalid)?;
        subscription.ping_from_client();

        let results: Vec<StatusCode> = request
            .monitored_item_ids
            .iter()
            .map(|&monitored_item_id| {
                subscription.set_monitoring_mode(monitored_item_id, request.monitoring_mode)
            })
            .collect();
        Ok(SetMonitoringModeResponse { results })
    }

    pub fn delete_monitored_items(
        &self,
        request: &DeleteMonitoredItemsRequest,
    ) -> Result<DeleteMonitoredItemsResponse, StatusCode> {
        if request.monitored_item_ids.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let subscription_id = request.subscription_id;
        let mut released = Vec::new();
        let results: Vec<StatusCode> = {
            let mut state = self.state();
            let subscription = state
                .subscriptions
                .get_mut(&subscription_id)
                .ok_or(StatusCode::BadSubscriptionIdInvalid)?;
            subscription.ping_from_client();

            request
                .monitored_item_ids
                .iter()
                .map(|&monitored_item_id| {
                    let status = subscription.delete_monitored_item(monitored_item_id);
                    if status.is_good() {
                        released.push(MonitoredItemHandle {
                            subscription_id,
                            monitored_item_id,
                        });
                    }
                    status
                })
                .collect()
        };
        self.unregister(released);
        Ok(DeleteMonitoredItemsResponse { results })
    }

    pub fn republish(&self, request: &RepublishRequest) -> Result<RepublishResponse, StatusCode> {
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(&request.subscription_id)
            .ok_or(StatusCode::BadSubscriptionIdInvalid)?;
        subscription.ping_from_client();
        let notification_message = subscription.republish(request.retransmit_sequence_number)?;
        Ok(RepublishResponse {
            notification_message,
        })
    }

    /// Moves a subscription to the `target` session.
    ///
    /// This session's next Publish request receives a
    /// `GoodSubscriptionTransferred` status change before anything else.
    /// Returns the sequence numbers still available for republish.
    pub fn transfer_subscription(
        &self,
        subscription_id: u32,
        target: &ServerSidePublishEngine,
        keep_old_notifications: bool,
    ) -> Result<Vec<u32>, StatusCode> {
        if std::ptr::eq(self, target) {
            return self
                .inspect_subscription(subscription_id, Subscription::available_sequence_numbers)
                .ok_or(StatusCode::BadSubscriptionIdInvalid);
        }
        if target.is_closed() {
            return Err(StatusCode::BadSessionClosed);
        }
        let target_max = target.limits.max_subscriptions_per_session;
        if target_max != 0 && target.subscription_count() >= target_max {
            return Err(StatusCode::BadTooManySubscriptions);
        }

        // Source and target are never locked at the same time.
        let subscription = {
            let mut state = self.state();
            let mut subscription = state
                .subscriptions
                .remove(&subscription_id)
                .ok_or(StatusCode::BadSubscriptionIdInvalid)?;
            let notice =
                subscription.status_change_notice(StatusCode::GoodSubscriptionTransferred);
            subscription.prepare_transfer(keep_old_notifications);
            state.status_notices.push_back(StatusNotice {
                subscription_id,
                message: notice,
            });
            self.settle(&mut state);
            subscription
        };

        let item_handles: Vec<(MonitoredItemHandle, ReadValueId)> = subscription
            .monitored_items()
            .map(|item| {
                (
                    MonitoredItemHandle {
                        subscription_id,
                        monitored_item_id: item.monitored_item_id(),
                    },
                    item.item_to_monitor().clone(),
                )
            })
            .collect();
        let available_sequence_numbers = match target.adopt(subscription) {
            Ok(available_sequence_numbers) => available_sequence_numbers,
            Err(status) => {
                // The target closed after the check above and already
                // released the items through its own node manager.
                if !Arc::ptr_eq(&self.node_manager, &target.node_manager) {
                    for (handle, _) in &item_handles {
                        self.node_manager.unregister_monitored_item(*handle);
                    }
                }
                return Err(status);
            }
        };

        if !Arc::ptr_eq(&self.node_manager, &target.node_manager) {
            for (handle, item_to_monitor) in &item_handles {
                self.node_manager.unregister_monitored_item(*handle);
                target
                    .node_manager
                    .register_monitored_item(*handle, item_to_monitor);
            }
        }

        info!(
            event = events::SUBSCRIPTION_TRANSFERRED,
            component = COMPONENT,
            subscription_id,
            from_session_id = self.session_id,
            to_session_id = target.session_id,
            keep_old_notifications,
            "subscription transferred"
        );
        let transferred = EngineEvent::Transferred {
            subscription_id,
            from_session_id: self.session_id,
            to_session_id: target.session_id,
        };
        self.emit(transferred.clone());
        target.emit(transferred);

        Ok(available_sequence_numbers)
    }

    // Takes ownership of a transferred subscription. A closed engine
    // terminates it instead.
    fn adopt(&self, mut subscription: Subscription) -> Result<Vec<u32>, StatusCode> {
        let subscription_id = subscription.subscription_id();
        let available_sequence_numbers = subscription.available_sequence_numbers();
        let mut state = self.state();
        if state.closed {
            let released = subscription.terminate();
            drop(state);
            self.unregister(
                released
                    .into_iter()
                    .map(|monitored_item_id| MonitoredItemHandle {
                        subscription_id,
                        monitored_item_id,
                    })
                    .collect(),
            );
            return Err(StatusCode::BadSessionClosed);
        }
        self.arm_timers(&mut subscription);
        state.subscriptions.insert(subscription_id, subscription);
        self.serve_ready_subscriptions(&mut state);
        Ok(available_sequence_numbers)
    }

    /// First page of `(monitored item id, client handle)` pairs; a token is
    /// returned when more remain.
    pub fn get_monitored_items(
        &self,
        subscription_id: u32,
        max_elements: usize,
    ) -> Result<Page<MonitoredItemSummary>, StatusCode> {
        let summaries = self
            .inspect_subscription(subscription_id, |subscription| {
                subscription
                    .monitored_items()
                    .map(|item| MonitoredItemSummary {
                        monitored_item_id: item.monitored_item_id(),
                        client_handle: item.client_handle(),
                    })
                    .collect::<Vec<_>>()
            })
            .ok_or(StatusCode::BadSubscriptionIdInvalid)?;
        self.continuation_points.register(max_elements, summaries)
    }

    pub fn get_monitored_items_next(
        &self,
        continuation_point: &ContinuationPoint,
    ) -> Result<Page<MonitoredItemSummary>, StatusCode> {
        self.continuation_points.get_next(continuation_point)
    }

    pub fn release_continuation_point(&self, continuation_point: &ContinuationPoint) -> bool {
        self.continuation_points.cancel(continuation_point)
    }

    /// Closes the session: terminates every subscription and answers every
    /// waiting Publish request with `BadSessionClosed`.
    pub fn shutdown(&self) {
        let released = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;

            let mut released = Vec::new();
            for (subscription_id, mut subscription) in state.subscriptions.drain() {
                released.extend(subscription.terminate().into_iter().map(
                    |monitored_item_id| MonitoredItemHandle {
                        subscription_id,
                        monitored_item_id,
                    },
                ));
                self.emit(EngineEvent::Terminated {
                    session_id: self.session_id,
                    subscription_id,
                });
            }
            let pending: Vec<_> = state.pending_requests.drain(..).collect();
            for request in pending {
                self.fault(request, StatusCode::BadSessionClosed);
            }
            state.status_notices.clear();
            released
        };
        self.continuation_points.clear();
        self.unregister(released);

        info!(
            event = events::ENGINE_SHUTDOWN,
            component = COMPONENT,
            session_id = self.session_id,
            reason = fields::REASON_SESSION_CLOSED,
            "publish engine shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineEvent, ServerSidePublishEngine, SubscriptionIdAllocator};
    use crate::subscription::{Subscription, SubscriptionParameters};
    use crate::clock::ManualClock;
    use crate::config::SubscriptionLimits;
    use crate::node_manager::NodeManager;
    use crate::status::StatusCode;
    use crate::types::{
        AttributeId, CreateMonitoredItemsRequest, CreateSubscriptionRequest, DataValue,
        DeleteSubscriptionsRequest, MonitoredItemCreateRequest, MonitoredItemHandle,
        MonitoringMode, MonitoringParameters, NodeId, PublishRequest, PublishResult, ReadValueId,
        SubscriptionAcknowledgement, TimestampsToReturn, Variant,
    };
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct Recording {
        registered: Mutex<Vec<MonitoredItemHandle>>,
        unregistered: Mutex<Vec<MonitoredItemHandle>>,
    }

    impl NodeManager for Recording {
        fn sample_value(&self, node_id: &NodeId, _attribute_id: AttributeId) -> DataValue {
            match node_id {
                NodeId::Numeric { value, .. } => DataValue::new(*value),
                NodeId::String { .. } => DataValue::new("text"),
            }
        }

        fn register_monitored_item(&self, handle: MonitoredItemHandle, _item: &ReadValueId) {
            self.registered.lock().expect("lock").push(handle);
        }

        fn unregister_monitored_item(&self, handle: MonitoredItemHandle) {
            self.unregistered.lock().expect("lock").push(handle);
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        node_manager: Arc<Recording>,
        allocator: Arc<SubscriptionIdAllocator>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                clock: Arc::new(ManualClock::new()),
                node_manager: Arc::new(Recording::default()),
                allocator: Arc::new(SubscriptionIdAllocator::default()),
            }
        }

        fn engine(&self, session_id: u32, limits: SubscriptionLimits) -> Arc<ServerSidePublishEngine> {
            ServerSidePublishEngine::new(
                session_id,
                limits,
                self.clock.clone(),
                self.node_manager.clone(),
                self.allocator.clone(),
            )
            .expect("valid limits")
        }
    }

    fn subscription_request(publishing_interval: f64) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            requested_publishing_interval: publishing_interval,
            ..Default::default()
        }
    }

    fn publish(request_handle: u32) -> PublishRequest {
        PublishRequest {
            request_handle,
            ..Default::default()
        }
    }

    fn items(subscription_id: u32, node_values: &[u32], sampling_interval: f64) -> CreateMonitoredItemsRequest {
        CreateMonitoredItemsRequest {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Both,
            items_to_create: node_values
                .iter()
                .map(|&value| MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId::value_of(NodeId::numeric(2, value)),
                    monitoring_mode: MonitoringMode::Reporting,
                    requested_parameters: MonitoringParameters {
                        client_handle: value,
                        sampling_interval,
                        queue_size: 1,
                        discard_oldest: true,
                    },
                })
                .collect(),
        }
    }

    fn answered(receiver: &mut oneshot::Receiver<PublishResult>) -> PublishResult {
        receiver.try_recv().expect("publish request answered")
    }

    #[test]
    fn publish_without_subscriptions_faults() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());

        let mut receiver = engine.on_publish_request(publish(5));
        let fault = answered(&mut receiver).expect_err("fault expected");

        assert_eq!(fault.request_handle, 5);
        assert_eq!(fault.service_result, StatusCode::BadNoSubscription);
        assert_eq!(engine.pending_publish_request_count(), 0);
    }

    #[test]
    fn first_cycle_answers_with_keep_alive() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        let created = engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription");

        let mut receiver = engine.on_publish_request(publish(1));
        assert_eq!(engine.pending_publish_request_count(), 1);
        assert!(receiver.try_recv().is_err());

        fixture.clock.advance_ms(100);
        let response = answered(&mut receiver).expect("response");
        assert_eq!(response.subscription_id, created.subscription_id);
        assert!(response.notification_message.is_keep_alive());
        assert_eq!(response.notification_message.sequence_number, 1);
        assert_eq!(engine.pending_publish_request_count(), 0);
    }

    #[test]
    fn data_change_is_published_and_acknowledged() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        let subscription_id = engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription")
            .subscription_id;
        let results = engine
            .create_monitored_items(&items(subscription_id, &[1001], 0.0))
            .expect("items")
            .results;
        assert_eq!(results[0].status_code, StatusCode::Good);
        assert_eq!(fixture.node_manager.registered.lock().expect("lock").len(), 1);

        let mut first = engine.on_publish_request(publish(1));
        fixture.clock.advance_ms(100);
        let response = answered(&mut first).expect("response");
        let values: Vec<_> = response.notification_message.data_values().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].client_handle, 1001);
        assert_eq!(values[0].value.value, Some(Variant::UInt32(1001)));
        assert_eq!(response.available_sequence_numbers, vec![1]);

        let mut second = engine.on_publish_request(PublishRequest {
            request_handle: 2,
            timeout_hint: 0,
            subscription_acknowledgements: vec![
                SubscriptionAcknowledgement {
                    subscription_id,
                    sequence_number: 1,
                },
                SubscriptionAcknowledgement {
                    subscription_id: 999,
                    sequence_number: 1,
                },
            ],
        });
        engine.notify_data_change(
            MonitoredItemHandle {
                subscription_id,
                monitored_item_id: results[0].monitored_item_id,
            },
            DataValue::new(7),
        );
        fixture.clock.advance_ms(100);

        let response = answered(&mut second).expect("response");
        assert_eq!(
            response.results,
            vec![StatusCode::Good, StatusCode::BadSubscriptionIdInvalid]
        );
        assert_eq!(response.notification_message.sequence_number, 2);
        assert_eq!(response.available_sequence_numbers, vec![2]);
    }

    #[test]
    fn oldest_request_carries_first_ready_output() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        let first = engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription")
            .subscription_id;
        let second = engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription")
            .subscription_id;

        let mut r1 = engine.on_publish_request(publish(1));
        let mut r2 = engine.on_publish_request(publish(2));
        fixture.clock.advance_ms(100);

        assert_eq!(answered(&mut r1).expect("r1").subscription_id, first);
        assert_eq!(answered(&mut r2).expect("r2").subscription_id, second);
    }

    #[test]
    fn newest_request_rejected_when_queue_full() {
        let fixture = Fixture::new();
        let limits = SubscriptionLimits {
            max_pending_publish_requests: 2,
            ..Default::default()
        };
        let engine = fixture.engine(1, limits);
        let mut events = engine.events();
        engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription");

        let mut r1 = engine.on_publish_request(publish(1));
        let _r2 = engine.on_publish_request(publish(2));
        let mut r3 = engine.on_publish_request(publish(3));

        let fault = answered(&mut r3).expect_err("fault");
        assert_eq!(fault.service_result, StatusCode::BadTooManyPublishRequests);
        assert!(r1.try_recv().is_err());
        assert_eq!(engine.pending_publish_request_count(), 2);
        assert_eq!(
            events.try_recv().expect("event"),
            EngineEvent::PublishRejected {
                session_id: 1,
                request_handle: 3,
                status: StatusCode::BadTooManyPublishRequests,
            }
        );
    }

    #[test]
    fn overdue_request_times_out() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription");

        let mut receiver = engine.on_publish_request(PublishRequest {
            request_handle: 9,
            timeout_hint: 50,
            ..Default::default()
        });
        fixture.clock.advance_ms(100);

        let fault = answered(&mut receiver).expect_err("fault");
        assert_eq!(fault.request_handle, 9);
        assert_eq!(fault.service_result, StatusCode::BadTimeout);
    }

    #[test]
    fn expired_subscription_reports_timeout_status_change() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        let subscription_id = engine
            .create_subscription(&CreateSubscriptionRequest {
                requested_publishing_interval: 100.0,
                requested_lifetime_count: 3,
                requested_max_keep_alive_count: 1,
                ..Default::default()
            })
            .expect("subscription")
            .subscription_id;

        fixture.clock.advance_ms(300);
        assert_eq!(engine.subscription_count(), 0);
        assert_eq!(fixture.clock.active_timers(), 0);

        let mut receiver = engine.on_publish_request(publish(4));
        let response = answered(&mut receiver).expect("status change");
        assert_eq!(response.subscription_id, subscription_id);
        assert_eq!(
            response.notification_message.status_change_code(),
            Some(StatusCode::BadTimeout)
        );

        let mut receiver = engine.on_publish_request(publish(5));
        let fault = answered(&mut receiver).expect_err("fault");
        assert_eq!(fault.service_result, StatusCode::BadNoSubscription);
    }

    #[test]
    fn delete_cancels_timers_and_faults_orphaned_requests() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        let subscription_id = engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription")
            .subscription_id;
        engine
            .create_monitored_items(&items(subscription_id, &[1, 2], 200.0))
            .expect("items");
        assert_eq!(fixture.clock.active_timers(), 3);

        let mut first = engine.on_publish_request(publish(1));
        let mut second = engine.on_publish_request(publish(2));

        let response = engine.delete_subscriptions(&DeleteSubscriptionsRequest {
            subscription_ids: vec![subscription_id, 77],
        });
        assert_eq!(
            response.results,
            vec![StatusCode::Good, StatusCode::BadSubscriptionIdInvalid]
        );
        assert_eq!(fixture.clock.active_timers(), 0);
        assert_eq!(fixture.node_manager.unregistered.lock().expect("lock").len(), 2);
        for receiver in [&mut first, &mut second] {
            assert_eq!(
                answered(receiver).expect_err("fault").service_result,
                StatusCode::BadNoSubscription
            );
        }
    }

    #[test]
    fn transfer_notifies_old_session_first() {
        let fixture = Fixture::new();
        let source = fixture.engine(1, SubscriptionLimits::default());
        let target = fixture.engine(2, SubscriptionLimits::default());
        let subscription_id = source
            .create_subscription(&subscription_request(100.0))
            .expect("subscription")
            .subscription_id;

        let available = source
            .transfer_subscription(subscription_id, &target, false)
            .expect("transfer");
        assert!(available.is_empty());
        assert_eq!(source.subscription_count(), 0);
        assert_eq!(target.subscription_ids(), vec![subscription_id]);

        let mut notice = source.on_publish_request(publish(1));
        let response = answered(&mut notice).expect("status change");
        assert_eq!(response.subscription_id, subscription_id);
        assert_eq!(
            response.notification_message.status_change_code(),
            Some(StatusCode::GoodSubscriptionTransferred)
        );

        let mut on_target = target.on_publish_request(publish(2));
        fixture.clock.advance_ms(100);
        let response = answered(&mut on_target).expect("keep-alive");
        assert_eq!(response.subscription_id, subscription_id);
        assert!(response.notification_message.is_keep_alive());
    }

    #[test]
    fn closed_engine_refuses_adopted_subscription() {
        let fixture = Fixture::new();
        let target = fixture.engine(2, SubscriptionLimits::default());
        let limits = SubscriptionLimits::default();
        let mut subscription = Subscription::new(
            fixture.allocator.next_id(),
            SubscriptionParameters::revised(&subscription_request(100.0), &limits),
            limits,
            fixture.clock.clone(),
        )
        .expect("subscription");
        let created = subscription.create_monitored_item(
            TimestampsToReturn::Both,
            &items(subscription.subscription_id(), &[10], 0.0).items_to_create[0],
        );
        assert!(created.status_code.is_good());

        target.shutdown();
        assert_eq!(
            target.adopt(subscription),
            Err(StatusCode::BadSessionClosed)
        );
        assert_eq!(target.subscription_count(), 0);
        assert_eq!(fixture.clock.active_timers(), 0);
        assert_eq!(
            fixture.node_manager.unregistered.lock().expect("lock").len(),
            1
        );
    }

    #[test]
    fn monitored_items_are_listed_in_pages() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        let subscription_id = engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription")
            .subscription_id;
        engine
            .create_monitored_items(&items(subscription_id, &[10, 20, 30, 40, 50], 0.0))
            .expect("items");

        let first = engine
            .get_monitored_items(subscription_id, 2)
            .expect("first page");
        let handles: Vec<u32> = first.values.iter().map(|item| item.client_handle).collect();
        assert_eq!(handles, vec![10, 20]);

        let second = engine
            .get_monitored_items_next(&first.continuation_point.expect("token"))
            .expect("second page");
        let third = engine
            .get_monitored_items_next(&second.continuation_point.expect("token"))
            .expect("third page");
        assert_eq!(third.values.len(), 1);
        assert_eq!(third.values[0].client_handle, 50);
        assert!(third.continuation_point.is_none());

        assert_eq!(
            engine.get_monitored_items(99, 2),
            Err(StatusCode::BadSubscriptionIdInvalid)
        );
    }

    #[test]
    fn shutdown_faults_waiting_requests() {
        let fixture = Fixture::new();
        let engine = fixture.engine(1, SubscriptionLimits::default());
        engine
            .create_subscription(&subscription_request(100.0))
            .expect("subscription");
        let mut waiting = engine.on_publish_request(publish(1));

        engine.shutdown();

        assert_eq!(
            answered(&mut waiting).expect_err("fault").service_result,
            StatusCode::BadSessionClosed
        );
        assert_eq!(engine.subscription_count(), 0);
        assert_eq!(fixture.clock.active_timers(), 0);
        let mut late = engine.on_publish_request(publish(2));
        assert_eq!(
            answered(&mut late).expect_err("fault").service_result,
            StatusCode::BadSessionClosed
        );
        assert_eq!(
            engine.create_subscription(&subscription_request(100.0)),
            Err(StatusCode::BadSessionClosed)
        );
    }

    #[test]
    fn allocator_skips_zero() {
        let allocator = SubscriptionIdAllocator::default();
        allocator.next.store(u32::MAX, std::sync::atomic::Ordering::Relaxed);
        assert_eq!(allocator.next_id(), u32::MAX);
        assert_eq!(allocator.next_id(), 1);
    }
}
