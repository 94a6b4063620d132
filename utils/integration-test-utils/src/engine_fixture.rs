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

use crate::RecordingNodeManager;
use std::sync::Arc;
use tokio::sync::oneshot;
use ua_subscriptions::{
    ManualClock, PublishResponse, PublishResult, ServerSidePublishEngine, SubscriptionIdAllocator,
    SubscriptionLimits,
};

/// A manual clock, a recording node manager and a shared id allocator from
/// which any number of session engines can be built.
pub struct EngineFixture {
    pub clock: Arc<ManualClock>,
    pub node_manager: Arc<RecordingNodeManager>,
    pub allocator: Arc<SubscriptionIdAllocator>,
}

impl Default for EngineFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFixture {
    pub fn new() -> Self {
        crate::init_logging();
        Self {
            clock: Arc::new(ManualClock::new()),
            node_manager: Arc::new(RecordingNodeManager::new()),
            allocator: Arc::new(SubscriptionIdAllocator::default()),
        }
    }

    pub fn engine(&self, session_id: u32, limits: SubscriptionLimits) -> Arc<ServerSidePublishEngine> {
        ServerSidePublishEngine::new(
            session_id,
            limits,
            self.clock.clone(),
            self.node_manager.clone(),
            self.allocator.clone(),
        )
        .expect("engine limits should be valid")
    }

    pub fn advance_ms(&self, millis: u64) {
        self.clock.advance_ms(millis);
    }
}

/// The answer of a Publish request that must already be resolved.
pub fn answered(receiver: &mut oneshot::Receiver<PublishResult>) -> PublishResult {
    receiver
        .try_recv()
        .expect("publish request should have been answered")
}

/// Asserts that the data messages of one subscription carry strictly
/// consecutive sequence numbers.
pub fn check_sequence_numbers_in_order(responses: &[PublishResponse], subscription_id: u32) {
    let sequence_numbers: Vec<u32> = responses
        .iter()
        .filter(|response| response.subscription_id == subscription_id)
        .filter(|response| !response.notification_message.is_keep_alive())
        .map(|response| response.notification_message.sequence_number)
        .collect();

    for pair in sequence_numbers.windows(2) {
        assert_eq!(
            pair[1],
            pair[0] + 1,
            "sequence numbers out of order for subscription {subscription_id}: {sequence_numbers:?}"
        );
    }
}
