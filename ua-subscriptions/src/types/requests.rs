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

use crate::status::StatusCode;
use crate::types::{MonitoringMode, NotificationMessage, ReadValueId, TimestampsToReturn};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

impl Default for CreateSubscriptionRequest {
    fn default() -> Self {
        Self {
            requested_publishing_interval: 1000.0,
            requested_lifetime_count: 30,
            requested_max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: u32,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionRequest {
    pub subscription_id: u32,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub priority: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionResponse {
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringParameters {
    pub client_handle: u32,
    /// Milliseconds; negative selects the publishing interval, zero relies on pushed changes only.
    pub sampling_interval: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            client_handle: 0,
            sampling_interval: -1.0,
            queue_size: 1,
            discard_oldest: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateRequest {
    pub item_to_monitor: ReadValueId,
    #[serde(default)]
    pub monitoring_mode: MonitoringMode,
    #[serde(default)]
    pub requested_parameters: MonitoringParameters,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateMonitoredItemsRequest {
    pub subscription_id: u32,
    #[serde(default)]
    pub timestamps_to_return: TimestampsToReturn,
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    pub status_code: StatusCode,
    pub monitored_item_id: u32,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

impl MonitoredItemCreateResult {
    pub(crate) fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            monitored_item_id: 0,
            revised_sampling_interval: 0.0,
            revised_queue_size: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateMonitoredItemsResponse {
    pub results: Vec<MonitoredItemCreateResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetMonitoringModeRequest {
    pub subscription_id: u32,
    pub monitoring_mode: MonitoringMode,
    pub monitored_item_ids: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetMonitoringModeResponse {
    pub results: Vec<StatusCode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsRequest {
    pub subscription_id: u32,
    pub monitored_item_ids: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsResponse {
    pub results: Vec<StatusCode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetPublishingModeRequest {
    pub publishing_enabled: bool,
    pub subscription_ids: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetPublishingModeResponse {
    pub results: Vec<StatusCode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteSubscriptionsRequest {
    pub subscription_ids: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteSubscriptionsResponse {
    pub results: Vec<StatusCode>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Echoed back in the response or fault.
    pub request_handle: u32,
    /// Milliseconds the client is willing to wait; 0 waits indefinitely.
    #[serde(default)]
    pub timeout_hint: u32,
    #[serde(default)]
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub request_handle: u32,
    pub subscription_id: u32,
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
    /// One entry per acknowledgement carried by the matching request.
    pub results: Vec<StatusCode>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServiceFault {
    pub request_handle: u32,
    pub service_result: StatusCode,
}

/// Outcome of a Publish request: a response, or a fault for the whole request.
pub type PublishResult = Result<PublishResponse, ServiceFault>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepublishRequest {
    pub subscription_id: u32,
    pub retransmit_sequence_number: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepublishResponse {
    pub notification_message: NotificationMessage,
}
