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
use crate::types::{NotificationMessage, PublishRequest, PublishResponse, PublishResult, ServiceFault};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A Publish request parked until some subscription has output for it.
pub(crate) struct PendingPublishRequest {
    request_handle: u32,
    acknowledgement_results: Vec<StatusCode>,
    deadline: Option<Instant>,
    responder: oneshot::Sender<PublishResult>,
}

impl PendingPublishRequest {
    pub(crate) fn new(
        request: &PublishRequest,
        acknowledgement_results: Vec<StatusCode>,
        received_at: Instant,
        responder: oneshot::Sender<PublishResult>,
    ) -> Self {
        let deadline = (request.timeout_hint > 0).then(|| {
            received_at + Duration::from_millis(u64::from(request.timeout_hint))
        });
        Self {
            request_handle: request.request_handle,
            acknowledgement_results,
            deadline,
            responder,
        }
    }

    pub(crate) fn request_handle(&self) -> u32 {
        self.request_handle
    }

    pub(crate) fn is_timed_out(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// The client stopped waiting (its receiver was dropped).
    pub(crate) fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }

    /// Answers the request; `false` if the client is gone.
    pub(crate) fn respond(
        self,
        subscription_id: u32,
        notification_message: NotificationMessage,
        more_notifications: bool,
        available_sequence_numbers: Vec<u32>,
    ) -> bool {
        self.responder
            .send(Ok(PublishResponse {
                request_handle: self.request_handle,
                subscription_id,
                available_sequence_numbers,
                more_notifications,
                notification_message,
                results: self.acknowledgement_results,
            }))
            .is_ok()
    }

    pub(crate) fn fault(self, service_result: StatusCode) -> bool {
        self.responder
            .send(Err(ServiceFault {
                request_handle: self.request_handle,
                service_result,
            }))
            .is_ok()
    }
}

/// Answers a request that never made it into the queue.
pub(crate) fn fault_immediately(
    responder: oneshot::Sender<PublishResult>,
    request_handle: u32,
    service_result: StatusCode,
) {
    // A dropped receiver means nobody is waiting for the fault either.
    let _ = responder.send(Err(ServiceFault {
        request_handle,
        service_result,
    }));
}
