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

//! Request-level facade over a session's publish engine.

use crate::publish_engine::ServerSidePublishEngine;
use crate::status::StatusCode;
use crate::types::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse,
    DeleteSubscriptionsRequest, DeleteSubscriptionsResponse, ModifySubscriptionRequest,
    ModifySubscriptionResponse, PublishRequest, PublishResponse, RepublishRequest,
    RepublishResponse, ServiceFault, SetMonitoringModeRequest, SetMonitoringModeResponse,
    SetPublishingModeRequest, SetPublishingModeResponse,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const COMPONENT: &str = "subscription_service";

/// A decoded subscription-related service request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServiceRequest {
    CreateSubscription(CreateSubscriptionRequest),
    ModifySubscription(ModifySubscriptionRequest),
    SetPublishingMode(SetPublishingModeRequest),
    DeleteSubscriptions(DeleteSubscriptionsRequest),
    CreateMonitoredItems(CreateMonitoredItemsRequest),
    SetMonitoringMode(SetMonitoringModeRequest),
    DeleteMonitoredItems(DeleteMonitoredItemsRequest),
    Publish(PublishRequest),
    Republish(RepublishRequest),
}

impl ServiceRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceRequest::CreateSubscription(_) => "CreateSubscription",
            ServiceRequest::ModifySubscription(_) => "ModifySubscription",
            ServiceRequest::SetPublishingMode(_) => "SetPublishingMode",
            ServiceRequest::DeleteSubscriptions(_) => "DeleteSubscriptions",
            ServiceRequest::CreateMonitoredItems(_) => "CreateMonitoredItems",
            ServiceRequest::SetMonitoringMode(_) => "SetMonitoringMode",
            ServiceRequest::DeleteMonitoredItems(_) => "DeleteMonitoredItems",
            ServiceRequest::Publish(_) => "Publish",
            ServiceRequest::Republish(_) => "Republish",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServiceResponse {
    CreateSubscription(CreateSubscriptionResponse),
    ModifySubscription(ModifySubscriptionResponse),
    SetPublishingMode(SetPublishingModeResponse),
    DeleteSubscriptions(DeleteSubscriptionsResponse),
    CreateMonitoredItems(CreateMonitoredItemsResponse),
    SetMonitoringMode(SetMonitoringModeResponse),
    DeleteMonitoredItems(DeleteMonitoredItemsResponse),
    Publish(PublishResponse),
    Republish(RepublishResponse),
    /// The whole request failed.
    Fault(ServiceFault),
}

impl ServiceResponse {
    /// `Good` unless the response is a fault.
    pub fn service_result(&self) -> StatusCode {
        match self {
            ServiceResponse::Fault(fault) => fault.service_result,
            _ => StatusCode::Good,
        }
    }
}

/// Answers subscription service requests for one session.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Handles one request. Publish requests resolve only once the engine
    /// has output for them, times them out, or closes.
    async fn call(&self, request_handle: u32, request: ServiceRequest) -> ServiceResponse;
}

fn respond<T>(
    request_handle: u32,
    result: Result<T, StatusCode>,
    into_response: impl FnOnce(T) -> ServiceResponse,
) -> ServiceResponse {
    match result {
        Ok(response) => into_response(response),
        Err(service_result) => ServiceResponse::Fault(ServiceFault {
            request_handle,
            service_result,
        }),
    }
}

#[async_trait]
impl SubscriptionService for ServerSidePublishEngine {
    async fn call(&self, request_handle: u32, request: ServiceRequest) -> ServiceResponse {
        debug!(
            component = COMPONENT,
            session_id = self.session_id(),
            request_handle,
            service = request.name(),
            "service request"
        );

        match request {
            ServiceRequest::CreateSubscription(request) => respond(
                request_handle,
                self.create_subscription(&request),
                ServiceResponse::CreateSubscription,
            ),
            ServiceRequest::ModifySubscription(request) => respond(
                request_handle,
                self.modify_subscription(&request),
                ServiceResponse::ModifySubscription,
            ),
            ServiceRequest::SetPublishingMode(request) => {
                ServiceResponse::SetPublishingMode(self.set_publishing_mode(&request))
            }
            ServiceRequest::DeleteSubscriptions(request) => {
                ServiceResponse::DeleteSubscriptions(self.delete_subscriptions(&request))
            }
            ServiceRequest::CreateMonitoredItems(request) => respond(
                request_handle,
                self.create_monitored_items(&request),
                ServiceResponse::CreateMonitoredItems,
            ),
            ServiceRequest::SetMonitoringMode(request) => respond(
                request_handle,
                self.set_monitoring_mode(&request),
                ServiceResponse::SetMonitoringMode,
            ),
            ServiceRequest::DeleteMonitoredItems(request) => respond(
                request_handle,
                self.delete_monitored_items(&request),
                ServiceResponse::DeleteMonitoredItems,
            ),
            ServiceRequest::Publish(mut request) => {
                request.request_handle = request_handle;
                match self.on_publish_request(request).await {
                    Ok(Ok(response)) => ServiceResponse::Publish(response),
                    Ok(Err(fault)) => ServiceResponse::Fault(fault),
                    // The engine dropped the request without answering it.
                    Err(_) => ServiceResponse::Fault(ServiceFault {
                        request_handle,
                        service_result: StatusCode::BadSessionClosed,
                    }),
                }
            }
            ServiceRequest::Republish(request) => respond(
                request_handle,
                self.republish(&request),
                ServiceResponse::Republish,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ServiceRequest, ServiceResponse, SubscriptionService};
    use crate::clock::ManualClock;
    use crate::config::SubscriptionLimits;
    use crate::node_manager::NodeManager;
    use crate::publish_engine::{ServerSidePublishEngine, SubscriptionIdAllocator};
    use crate::status::StatusCode;
    use crate::types::{
        AttributeId, CreateSubscriptionRequest, DataValue, ModifySubscriptionRequest, NodeId,
        PublishRequest, RepublishRequest,
    };
    use std::sync::Arc;

    struct Zero;

    impl NodeManager for Zero {
        fn sample_value(&self, _node_id: &NodeId, _attribute_id: AttributeId) -> DataValue {
            DataValue::new(0)
        }
    }

    fn engine(clock: Arc<ManualClock>) -> Arc<ServerSidePublishEngine> {
        ServerSidePublishEngine::new(
            1,
            SubscriptionLimits::default(),
            clock,
            Arc::new(Zero),
            Arc::new(SubscriptionIdAllocator::default()),
        )
        .expect("valid limits")
    }

    #[tokio::test]
    async fn publish_waits_for_keep_alive() {
        let clock = Arc::new(ManualClock::new());
        let engine = engine(clock.clone());

        let created = engine
            .call(
                1,
                ServiceRequest::CreateSubscription(CreateSubscriptionRequest {
                    requested_publishing_interval: 100.0,
                    ..Default::default()
                }),
            )
            .await;
        let ServiceResponse::CreateSubscription(created) = created else {
            panic!("unexpected response: {created:?}");
        };

        let publisher = engine.clone();
        let publish = tokio::spawn(async move {
            publisher
                .call(2, ServiceRequest::Publish(PublishRequest::default()))
                .await
        });
        while engine.pending_publish_request_count() == 0 {
            tokio::task::yield_now().await;
        }
        clock.advance_ms(100);

        let response = publish.await.expect("publish task");
        let ServiceResponse::Publish(response) = response else {
            panic!("unexpected response: {response:?}");
        };
        assert_eq!(response.request_handle, 2);
        assert_eq!(response.subscription_id, created.subscription_id);
        assert!(response.notification_message.is_keep_alive());
    }

    #[tokio::test]
    async fn failures_become_faults_carrying_the_request_handle() {
        let engine = engine(Arc::new(ManualClock::new()));

        let response = engine
            .call(7, ServiceRequest::Publish(PublishRequest::default()))
            .await;
        assert_eq!(response.service_result(), StatusCode::BadNoSubscription);

        let response = engine
            .call(
                8,
                ServiceRequest::ModifySubscription(ModifySubscriptionRequest {
                    subscription_id: 42,
                    requested_publishing_interval: 500.0,
                    requested_lifetime_count: 30,
                    requested_max_keep_alive_count: 10,
                    max_notifications_per_publish: 0,
                    priority: 0,
                }),
            )
            .await;
        let ServiceResponse::Fault(fault) = response else {
            panic!("unexpected response: {response:?}");
        };
        assert_eq!(fault.request_handle, 8);
        assert_eq!(fault.service_result, StatusCode::BadSubscriptionIdInvalid);

        let response = engine
            .call(
                9,
                ServiceRequest::Republish(RepublishRequest {
                    subscription_id: 42,
                    retransmit_sequence_number: 1,
                }),
            )
            .await;
        assert_eq!(response.service_result(), StatusCode::BadSubscriptionIdInvalid);
    }

    #[tokio::test]
    async fn closed_session_faults_publish() {
        let engine = engine(Arc::new(ManualClock::new()));
        engine.shutdown();

        let response = engine
            .call(3, ServiceRequest::Publish(PublishRequest::default()))
            .await;
        assert_eq!(response.service_result(), StatusCode::BadSessionClosed);
    }
}
