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

//! Canonical structured event names used across `ua-subscriptions`.

// Publish request matching.
pub const PUBLISH_REQUEST_QUEUED: &str = "publish_request_queued";
pub const PUBLISH_REQUEST_REJECTED: &str = "publish_request_rejected";
pub const PUBLISH_REQUEST_TIMED_OUT: &str = "publish_request_timed_out";
pub const PUBLISH_RESPONSE_SENT: &str = "publish_response_sent";
pub const PUBLISH_FAULT_SENT: &str = "publish_fault_sent";
pub const PUBLISH_RESPONSE_DROPPED: &str = "publish_response_dropped";
pub const PUBLISH_ACK_RESULT: &str = "publish_ack_result";

// Subscription lifecycle.
pub const SUBSCRIPTION_CREATED: &str = "subscription_created";
pub const SUBSCRIPTION_MODIFIED: &str = "subscription_modified";
pub const SUBSCRIPTION_DELETED: &str = "subscription_deleted";
pub const SUBSCRIPTION_NOTIFICATION: &str = "subscription_notification";
pub const SUBSCRIPTION_KEEPALIVE: &str = "subscription_keepalive";
pub const SUBSCRIPTION_LATE: &str = "subscription_late";
pub const SUBSCRIPTION_EXPIRED: &str = "subscription_expired";
pub const SUBSCRIPTION_TERMINATED: &str = "subscription_terminated";
pub const SUBSCRIPTION_TRANSFERRED: &str = "subscription_transferred";
pub const NOTIFICATION_DROPPED: &str = "notification_dropped";
pub const RETRANSMISSION_PURGED: &str = "retransmission_purged";

// Monitored items.
pub const MONITORED_ITEM_CREATED: &str = "monitored_item_created";
pub const MONITORED_ITEM_REJECTED: &str = "monitored_item_rejected";
pub const MONITORED_ITEM_DELETED: &str = "monitored_item_deleted";
pub const MONITORED_ITEM_OVERFLOW: &str = "monitored_item_overflow";
pub const MONITORED_ITEM_SAMPLE_FAILED: &str = "monitored_item_sample_failed";

// Continuation points.
pub const CONTINUATION_POINT_REGISTERED: &str = "continuation_point_registered";
pub const CONTINUATION_POINT_INVALID: &str = "continuation_point_invalid";
pub const CONTINUATION_POINT_EXHAUSTED: &str = "continuation_point_exhausted";
pub const CONTINUATION_POINT_RELEASED: &str = "continuation_point_released";

// Node managers.
pub const NODE_FILE_READ: &str = "node_file_read";
pub const NODES_LOADED: &str = "nodes_loaded";
pub const NODES_CHANGED: &str = "nodes_changed";
pub const NODE_UNKNOWN: &str = "node_unknown";

// Timers and runtime.
pub const TIMER_SCHEDULED: &str = "timer_scheduled";
pub const TIMER_CANCELLED: &str = "timer_cancelled";
pub const RUNTIME_SPAWN_OK: &str = "runtime_spawn_ok";
pub const RUNTIME_SPAWN_FAILED: &str = "runtime_spawn_failed";
pub const ENGINE_SHUTDOWN: &str = "engine_shutdown";
