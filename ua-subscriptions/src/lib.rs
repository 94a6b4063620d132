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

//! # ua-subscriptions
//!
//! `ua-subscriptions` is the server side of the OPC-UA subscription model:
//! subscriptions with their publishing, keep-alive and lifetime counters,
//! monitored items with bounded sample queues, and the per-session publish
//! engine that answers long-polling Publish requests.
//!
//! The crate is transport-agnostic. Callers hand in decoded requests and get
//! back response values; a [`Clock`] drives every timer so the whole engine can
//! run against [`ManualClock`] in tests and [`TokioClock`] in production.
//!
//! ## Create a subscription and publish
//!
//! ```
//! use std::sync::Arc;
//! use ua_subscriptions::{
//!     AttributeId, CreateSubscriptionRequest, DataValue, ManualClock, NodeId, NodeManager,
//!     PublishRequest, ServerSidePublishEngine, SubscriptionIdAllocator, SubscriptionLimits,
//! };
//!
//! struct Constant;
//!
//! impl NodeManager for Constant {
//!     fn sample_value(&self, _node_id: &NodeId, _attribute_id: AttributeId) -> DataValue {
//!         DataValue::new(42)
//!     }
//! }
//!
//! let clock = Arc::new(ManualClock::new());
//! let engine = ServerSidePublishEngine::new(
//!     1,
//!     SubscriptionLimits::default(),
//!     clock.clone(),
//!     Arc::new(Constant),
//!     Arc::new(SubscriptionIdAllocator::default()),
//! )
//! .unwrap();
//!
//! let created = engine
//!     .create_subscription(&CreateSubscriptionRequest {
//!         requested_publishing_interval: 100.0,
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let mut pending = engine.on_publish_request(PublishRequest {
//!     request_handle: 1,
//!     ..Default::default()
//! });
//! clock.advance_ms(100);
//!
//! // Nothing changed yet, so the first cycle answers with a keep-alive.
//! let response = pending.try_recv().unwrap().unwrap();
//! assert_eq!(response.subscription_id, created.subscription_id);
//! assert!(response.notification_message.is_keep_alive());
//! ```
//!
//! ## Internal architecture map
//!
//! - Numbering and paging: `sequence`, `continuation`
//! - State machines: `monitored_item`, `subscription`
//! - Session coordination: `publish_engine`, plus the async `service` facade
//! - Runtime: `clock` implementations and the dedicated timer runtime
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

pub mod clock;
pub use clock::{Clock, ManualClock, TimerHandle, TimerId, TokioClock};

mod config;
pub use config::SubscriptionLimits;

mod continuation;
pub use continuation::{ContinuationPoint, ContinuationPointManager, Page};

mod error;
pub use error::ConfigError;

mod monitored_item;
pub use monitored_item::{MonitoredItem, MonitoredItemSettings, SamplingEvent};

mod node_manager;
pub use node_manager::NodeManager;

#[doc(hidden)]
pub mod observability;

mod publish_engine;
pub use publish_engine::{
    EngineEvent, MonitoredItemSummary, ServerSidePublishEngine, SubscriptionIdAllocator,
};

mod runtime;

mod sequence;
pub use sequence::SequenceNumberGenerator;

mod service;
pub use service::{ServiceRequest, ServiceResponse, SubscriptionService};

mod status;
pub use status::StatusCode;

mod subscription;
pub use subscription::{Subscription, SubscriptionEvent, SubscriptionParameters, SubscriptionState};

pub mod types;
pub use types::*;
