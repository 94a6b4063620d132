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

//! Shared support for the workspace's integration tests.

mod engine_fixture;
pub use engine_fixture::{answered, check_sequence_numbers_in_order, EngineFixture};

mod recording_node_manager;
pub use recording_node_manager::RecordingNodeManager;

mod request_builders;
pub use request_builders::{
    monitored_items_request, publish_request, publish_with_acks, subscription_request,
};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly `tracing` subscriber once per process; later
/// calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
