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

//! Publish request matching, faults and session-level operations.

use integration_test_utils::{
    answered, monitored_items_request, publish_request, subscription_request, EngineFixture,
    RecordingNodeManager,
};
use std::sync::Arc;
use ua_subscriptions::{
    CreateMonitoredItemsRequest, MonitoredItemHandle, NodeId, PublishRequest,
    ServerSidePublishEngine, ServiceRequest, ServiceResponse, StatusCode, SubscriptionIdAllocator,
    SubscriptionLimits, SubscriptionService, TimestampsToReturn, TokioClock,
};

#[test]
fn engine_without_subscriptions_faults_immediately() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());

    for request_handle in 1..=3 {
        let mut receiver = engine.on_publish_request(publish_request(request_handle));
        let fault = answered(&mut receiver).expect_err("fault");
        assert_eq!(fault.request_handle, request_handle);
        assert_eq!(fault.service_result, StatusCode::BadNoSubscription);
    }
    assert_eq!(engine.pending_publish_request_count(), 0);
}

#[test]
fn first_ready_subscription_takes_the_oldest_request() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    let quiet = engine
        .create_subscription(&subscription_request(200.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    let busy = engine
        .create_subscription(&subscription_request(500.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    let nodes: Vec<NodeId> = (1..=20).map(|value| NodeId::numeric(2, value)).collect();
    engine
        .create_monitored_items(&monitored_items_request(busy, &nodes, 0.0, 1))
        .expect("items");

    let mut r1 = engine.on_publish_request(publish_request(1));
    let mut r2 = engine.on_publish_request(publish_request(2));

    fixture.advance_ms(200);
    let first = answered(&mut r1).expect("r1");
    assert_eq!(first.subscription_id, quiet);
    assert!(r2.try_recv().is_err());

    fixture.advance_ms(300);
    let second = answered(&mut r2).expect("r2");
    assert_eq!(second.subscription_id, busy);
    assert_eq!(second.notification_message.notification_count(), 20);
}

#[test]
fn late_subscription_is_served_on_request_arrival() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    let subscription_id = engine
        .create_subscription(&subscription_request(100.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    engine
        .create_monitored_items(&monitored_items_request(
            subscription_id,
            &[NodeId::numeric(2, 1)],
            0.0,
            1,
        ))
        .expect("items");

    fixture.advance_ms(100);
    let state = engine
        .inspect_subscription(subscription_id, |subscription| subscription.state())
        .expect("subscription");
    assert_eq!(state, ua_subscriptions::SubscriptionState::Late);

    let mut receiver = engine.on_publish_request(publish_request(1));
    let response = answered(&mut receiver).expect("late message");
    assert_eq!(response.notification_message.sequence_number, 1);
    assert_eq!(response.available_sequence_numbers, vec![1]);
}

#[test]
fn excess_publish_requests_fail_newest_first() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    engine
        .create_subscription(&subscription_request(1000.0, 30, 10))
        .expect("subscription");

    let mut accepted: Vec<_> = (1..=10)
        .map(|request_handle| engine.on_publish_request(publish_request(request_handle)))
        .collect();
    let mut rejected = engine.on_publish_request(publish_request(11));

    let fault = answered(&mut rejected).expect_err("fault");
    assert_eq!(fault.request_handle, 11);
    assert_eq!(fault.service_result, StatusCode::BadTooManyPublishRequests);
    assert_eq!(engine.pending_publish_request_count(), 10);

    // The oldest request is still the first one answered.
    fixture.advance_ms(1000);
    let response = answered(&mut accepted[0]).expect("oldest answered");
    assert_eq!(response.request_handle, 1);
    assert!(accepted[1].try_recv().is_err());
}

#[test]
fn transfer_notice_goes_to_waiting_request_of_old_session() {
    let fixture = EngineFixture::new();
    let old_session = fixture.engine(1, SubscriptionLimits::default());
    let new_session = fixture.engine(2, SubscriptionLimits::default());
    let moved = old_session
        .create_subscription(&subscription_request(1000.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    let stays = old_session
        .create_subscription(&subscription_request(1000.0, 30, 10))
        .expect("subscription")
        .subscription_id;

    let mut waiting = old_session.on_publish_request(publish_request(1));
    old_session
        .transfer_subscription(moved, &new_session, true)
        .expect("transfer");

    let response = answered(&mut waiting).expect("status change");
    assert_eq!(response.subscription_id, moved);
    assert_eq!(
        response.notification_message.status_change_code(),
        Some(StatusCode::GoodSubscriptionTransferred)
    );
    assert_eq!(old_session.subscription_ids(), vec![stays]);
    assert_eq!(new_session.subscription_ids(), vec![moved]);

    assert_eq!(
        old_session.transfer_subscription(moved, &new_session, true),
        Err(StatusCode::BadSubscriptionIdInvalid)
    );
}

#[test]
fn transferred_subscription_keeps_numbering_and_unacknowledged_messages() {
    let fixture = EngineFixture::new();
    let old_session = fixture.engine(1, SubscriptionLimits::default());
    let new_session = fixture.engine(2, SubscriptionLimits::default());
    let subscription_id = old_session
        .create_subscription(&subscription_request(100.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    old_session
        .create_monitored_items(&monitored_items_request(
            subscription_id,
            &[NodeId::numeric(2, 1)],
            0.0,
            1,
        ))
        .expect("items");
    let mut first = old_session.on_publish_request(publish_request(1));
    fixture.advance_ms(100);
    assert_eq!(answered(&mut first).expect("first").notification_message.sequence_number, 1);

    let available = old_session
        .transfer_subscription(subscription_id, &new_session, true)
        .expect("transfer");
    assert_eq!(available, vec![1]);

    let republished = new_session
        .republish(&ua_subscriptions::RepublishRequest {
            subscription_id,
            retransmit_sequence_number: 1,
        })
        .expect("retained message");
    assert_eq!(republished.notification_message.sequence_number, 1);

    let mut on_new = new_session.on_publish_request(publish_request(2));
    fixture.advance_ms(100);
    let keep_alive = answered(&mut on_new).expect("keep-alive");
    assert!(keep_alive.notification_message.is_keep_alive());
    assert_eq!(keep_alive.notification_message.sequence_number, 2);
}

#[test]
fn overdue_publish_request_times_out_at_next_cycle() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    engine
        .create_subscription(&subscription_request(1000.0, 30, 10))
        .expect("subscription");

    let mut impatient = engine.on_publish_request(PublishRequest {
        request_handle: 1,
        timeout_hint: 250,
        subscription_acknowledgements: Vec::new(),
    });
    let mut patient = engine.on_publish_request(publish_request(2));

    fixture.advance_ms(1000);
    assert_eq!(
        answered(&mut impatient).expect_err("fault").service_result,
        StatusCode::BadTimeout
    );
    assert!(answered(&mut patient)
        .expect("keep-alive")
        .notification_message
        .is_keep_alive());
}

#[test]
fn monitored_item_creation_reports_per_item_results() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    let subscription_id = engine
        .create_subscription(&subscription_request(100.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    fixture.node_manager.mark_unknown(NodeId::numeric(2, 404));

    let response = engine
        .create_monitored_items(&monitored_items_request(
            subscription_id,
            &[NodeId::numeric(2, 1), NodeId::numeric(2, 404), NodeId::numeric(2, 2)],
            -1.0,
            5,
        ))
        .expect("items");
    let statuses: Vec<StatusCode> = response
        .results
        .iter()
        .map(|result| result.status_code)
        .collect();
    assert_eq!(
        statuses,
        vec![StatusCode::Good, StatusCode::BadNodeIdUnknown, StatusCode::Good]
    );
    assert_eq!(response.results[0].monitored_item_id, 1);
    assert_eq!(response.results[2].monitored_item_id, 2);
    assert_eq!(response.results[0].revised_sampling_interval, 100.0);
    assert_eq!(fixture.node_manager.registered().len(), 2);

    let empty = CreateMonitoredItemsRequest {
        subscription_id,
        timestamps_to_return: TimestampsToReturn::Both,
        items_to_create: Vec::new(),
    };
    assert_eq!(
        engine.create_monitored_items(&empty),
        Err(StatusCode::BadNothingToDo)
    );
    assert_eq!(
        engine.create_monitored_items(&monitored_items_request(
            99,
            &[NodeId::numeric(2, 1)],
            0.0,
            1
        )),
        Err(StatusCode::BadSubscriptionIdInvalid)
    );
}

#[test]
fn monitored_items_page_through_continuation_points() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    let subscription_id = engine
        .create_subscription(&subscription_request(100.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    let nodes: Vec<NodeId> = (1..=8).map(|value| NodeId::numeric(2, value)).collect();
    engine
        .create_monitored_items(&monitored_items_request(subscription_id, &nodes, 0.0, 1))
        .expect("items");

    let first = engine
        .get_monitored_items(subscription_id, 2)
        .expect("first page");
    let mut pages = vec![first.values];
    let mut token = first.continuation_point.expect("token");
    let last_token = loop {
        let page = engine.get_monitored_items_next(&token).expect("next page");
        pages.push(page.values);
        match page.continuation_point {
            Some(next) => token = next,
            None => break token,
        }
    };

    let client_handles: Vec<Vec<u32>> = pages
        .iter()
        .map(|page| page.iter().map(|item| item.client_handle).collect())
        .collect();
    assert_eq!(
        client_handles,
        vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8]]
    );
    assert_eq!(
        engine.get_monitored_items_next(&last_token),
        Err(StatusCode::BadContinuationPointInvalid)
    );

    let abandoned = engine
        .get_monitored_items(subscription_id, 3)
        .expect("page")
        .continuation_point
        .expect("token");
    assert!(engine.release_continuation_point(&abandoned));
    assert_eq!(
        engine.get_monitored_items_next(&abandoned),
        Err(StatusCode::BadContinuationPointInvalid)
    );
}

#[test]
fn shutdown_releases_everything() {
    let fixture = EngineFixture::new();
    let engine = fixture.engine(1, SubscriptionLimits::default());
    let subscription_id = engine
        .create_subscription(&subscription_request(1000.0, 30, 10))
        .expect("subscription")
        .subscription_id;
    engine
        .create_monitored_items(&monitored_items_request(
            subscription_id,
            &[NodeId::numeric(2, 1), NodeId::numeric(2, 2)],
            250.0,
            1,
        ))
        .expect("items");
    let mut waiting = engine.on_publish_request(publish_request(1));

    engine.shutdown();

    assert_eq!(
        answered(&mut waiting).expect_err("fault").service_result,
        StatusCode::BadSessionClosed
    );
    assert_eq!(fixture.clock.active_timers(), 0);
    assert_eq!(
        fixture.node_manager.unregistered(),
        vec![
            MonitoredItemHandle {
                subscription_id,
                monitored_item_id: 1
            },
            MonitoredItemHandle {
                subscription_id,
                monitored_item_id: 2
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn service_publish_long_polls_on_tokio_timers() {
    integration_test_utils::init_logging();
    let clock = Arc::new(TokioClock::new(tokio::runtime::Handle::current()));
    let engine = ServerSidePublishEngine::new(
        1,
        SubscriptionLimits::default(),
        clock,
        Arc::new(RecordingNodeManager::new()),
        Arc::new(SubscriptionIdAllocator::default()),
    )
    .expect("engine");

    let created = engine
        .call(
            1,
            ServiceRequest::CreateSubscription(subscription_request(250.0, 30, 10)),
        )
        .await;
    let ServiceResponse::CreateSubscription(created) = created else {
        panic!("unexpected response: {created:?}");
    };

    let response = engine
        .call(2, ServiceRequest::Publish(PublishRequest::default()))
        .await;
    let ServiceResponse::Publish(response) = response else {
        panic!("unexpected response: {response:?}");
    };
    assert_eq!(response.request_handle, 2);
    assert_eq!(response.subscription_id, created.subscription_id);
    assert!(response.notification_message.is_keep_alive());

    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn concurrent_publish_calls_are_answered_in_arrival_order() {
    integration_test_utils::init_logging();
    let clock = Arc::new(TokioClock::new(tokio::runtime::Handle::current()));
    let engine = ServerSidePublishEngine::new(
        1,
        SubscriptionLimits::default(),
        clock,
        Arc::new(RecordingNodeManager::new()),
        Arc::new(SubscriptionIdAllocator::default()),
    )
    .expect("engine");
    engine
        .create_subscription(&subscription_request(250.0, 30, 10))
        .expect("subscription");

    let (first, second) = futures::future::join(
        engine.call(7, ServiceRequest::Publish(PublishRequest::default())),
        engine.call(8, ServiceRequest::Publish(PublishRequest::default())),
    )
    .await;

    let (ServiceResponse::Publish(first), ServiceResponse::Publish(second)) = (first, second)
    else {
        panic!("both calls should be answered with publish responses");
    };
    assert_eq!(first.request_handle, 7);
    assert_eq!(second.request_handle, 8);
    assert!(first.notification_message.is_keep_alive());
    assert!(second.notification_message.is_keep_alive());

    engine.shutdown();
}
