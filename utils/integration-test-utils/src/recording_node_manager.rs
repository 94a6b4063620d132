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

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use ua_subscriptions::{
    AttributeId, DataValue, MonitoredItemHandle, NodeId, NodeManager, ReadValueId, SamplingEvent,
    StatusCode,
};

#[derive(Default)]
struct Recorded {
    values: HashMap<NodeId, DataValue>,
    unknown: Vec<NodeId>,
    samples: usize,
    registered: Vec<MonitoredItemHandle>,
    unregistered: Vec<MonitoredItemHandle>,
}

/// In-memory node manager that records every interaction with the engine.
///
/// Nodes without an explicit value sample as `Int32(0)`; nodes marked unknown
/// fail validation with `BadNodeIdUnknown`.
#[derive(Default)]
pub struct RecordingNodeManager {
    recorded: Mutex<Recorded>,
}

impl RecordingNodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("recording node manager lock")
    }

    pub fn set_value(&self, node_id: NodeId, value: DataValue) {
        self.recorded().values.insert(node_id, value);
    }

    pub fn mark_unknown(&self, node_id: NodeId) {
        self.recorded().unknown.push(node_id);
    }

    pub fn sample_count(&self) -> usize {
        self.recorded().samples
    }

    pub fn registered(&self) -> Vec<MonitoredItemHandle> {
        self.recorded().registered.clone()
    }

    pub fn unregistered(&self) -> Vec<MonitoredItemHandle> {
        self.recorded().unregistered.clone()
    }
}

impl NodeManager for RecordingNodeManager {
    fn sample_value(&self, node_id: &NodeId, _attribute_id: AttributeId) -> DataValue {
        let mut recorded = self.recorded();
        recorded.samples += 1;
        recorded
            .values
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| DataValue::new(0))
    }

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

    fn validate(&self, item_to_monitor: &ReadValueId) -> StatusCode {
        if self.recorded().unknown.contains(&item_to_monitor.node_id) {
            StatusCode::BadNodeIdUnknown
        } else {
            StatusCode::Good
        }
    }

    fn register_monitored_item(&self, handle: MonitoredItemHandle, _item_to_monitor: &ReadValueId) {
        self.recorded().registered.push(handle);
    }

    fn unregister_monitored_item(&self, handle: MonitoredItemHandle) {
        self.recorded().unregistered.push(handle);
    }
}
