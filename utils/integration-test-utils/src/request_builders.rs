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

use ua_subscriptions::{
    CreateMonitoredItemsRequest, CreateSubscriptionRequest, MonitoredItemCreateRequest,
    MonitoringMode, MonitoringParameters, NodeId, PublishRequest, ReadValueId,
    SubscriptionAcknowledgement, TimestampsToReturn,
};

pub fn subscription_request(
    publishing_interval_ms: f64,
    lifetime_count: u32,
    max_keep_alive_count: u32,
) -> CreateSubscriptionRequest {
    CreateSubscriptionRequest {
        requested_publishing_interval: publishing_interval_ms,
        requested_lifetime_count: lifetime_count,
        requested_max_keep_alive_count: max_keep_alive_count,
        ..Default::default()
    }
}

pub fn publish_request(request_handle: u32) -> PublishRequest {
    PublishRequest {
        request_handle,
        ..Default::default()
    }
}

/// Publish request acknowledging `(subscription_id, sequence_number)` pairs.
pub fn publish_with_acks(request_handle: u32, acks: &[(u32, u32)]) -> PublishRequest {
    PublishRequest {
        request_handle,
        timeout_hint: 0,
        subscription_acknowledgements: acks
            .iter()
            .map(|&(subscription_id, sequence_number)| SubscriptionAcknowledgement {
                subscription_id,
                sequence_number,
            })
            .collect(),
    }
}

/// One reporting item per node; client handles count up from 1.
pub fn monitored_items_request(
    subscription_id: u32,
    nodes: &[NodeId],
    sampling_interval_ms: f64,
    queue_size: u32,
) -> CreateMonitoredItemsRequest {
    CreateMonitoredItemsRequest {
        subscription_id,
        timestamps_to_return: TimestampsToReturn::Both,
        items_to_create: nodes
            .iter()
            .zip(1..)
            .map(|(node_id, client_handle)| MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId::value_of(node_id.clone()),
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle,
                    sampling_interval: sampling_interval_ms,
                    queue_size,
                    discard_oldest: true,
                },
            })
            .collect(),
    }
}
