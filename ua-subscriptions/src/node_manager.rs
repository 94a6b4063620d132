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

//! Boundary to the address space that owns the monitored values.

use crate::monitored_item::SamplingEvent;
use crate::status::StatusCode;
use crate::types::{AttributeId, DataValue, MonitoredItemHandle, NodeId, ReadValueId};

/// Address-space collaborator consulted by the publish engine.
///
/// Calls arrive from timer callbacks and request handlers, never while the
/// engine holds its own lock, so implementations may call back into the
/// engine (e.g. `notify_data_change`).
pub trait NodeManager: Send + Sync {
    /// Reads the current value of one attribute.
    fn sample_value(&self, node_id: &NodeId, attribute_id: AttributeId) -> DataValue;

    /// Decides what a sampling tick records, if anything.
    ///
    /// The default samples the attribute and reports it only when value or
    /// status differ from the previously recorded one.
    fn on_sampling(&self, event: &SamplingEvent) -> Option<DataValue> {
        let sampled = self.sample_value(
            &event.item_to_monitor.node_id,
            event.item_to_monitor.attribute_id,
        );
        match &event.previous_value {
            Some(previous) if previous.same_value(&sampled) => None,
            _ => Some(sampled),
        }
    }

    /// Checks that `item_to_monitor` can be monitored at all.
    fn validate(&self, _item_to_monitor: &ReadValueId) -> StatusCode {
        StatusCode::Good
    }

    /// Called once a monitored item exists; push-model managers remember the
    /// handle and later feed changes through the engine.
    fn register_monitored_item(&self, _handle: MonitoredItemHandle, _item_to_monitor: &ReadValueId) {}

    fn unregister_monitored_item(&self, _handle: MonitoredItemHandle) {}
}
