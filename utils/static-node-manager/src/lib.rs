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

//! [`NodeManager`] backed by a static JSON file of node values.
//!
//! The file maps node ids in `ns=<n>;i=<id>` / `ns=<n>;s=<name>` notation to
//! scalar JSON values:
//!
//! ```json
//! { "ns=2;i=1001": 20.5, "ns=2;s=Pump.Running": true }
//! ```
//!
//! Values only change through [`StaticNodeManager::set_value`] or the
//! simulated stepping of [`StaticNodeManager::simulate_change`].

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use ua_subscriptions::observability::events;
use ua_subscriptions::{
    AttributeId, DataValue, MonitoredItemHandle, NodeId, NodeManager, ReadValueId, StatusCode,
    Variant,
};

const COMPONENT: &str = "static_node_manager";

#[derive(Debug, Error)]
pub enum StaticNodeError {
    #[error("unable to read node file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("unable to parse node file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("node file must contain a JSON object")]
    NotAnObject,
    #[error("invalid node id '{0}'")]
    InvalidNodeId(String),
    #[error("unsupported value for node '{0}'")]
    UnsupportedValue(String),
}

pub struct StaticNodeManager {
    nodes: Mutex<BTreeMap<NodeId, DataValue>>,
    registered: Mutex<HashMap<MonitoredItemHandle, ReadValueId>>,
}

impl StaticNodeManager {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StaticNodeError> {
        let path = path.as_ref();
        debug!(
            event = events::NODE_FILE_READ,
            component = COMPONENT,
            path = ?path,
            "reading static node file"
        );
        let data = fs::read_to_string(path).map_err(|source| StaticNodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(json: &str) -> Result<Self, StaticNodeError> {
        let parsed: Value = serde_json::from_str(json)?;
        let object = parsed.as_object().ok_or(StaticNodeError::NotAnObject)?;

        let now = Utc::now();
        let mut nodes = BTreeMap::new();
        for (key, value) in object {
            let node_id: NodeId = key
                .parse()
                .map_err(|_| StaticNodeError::InvalidNodeId(key.clone()))?;
            let variant =
                variant_from_json(value).ok_or_else(|| StaticNodeError::UnsupportedValue(key.clone()))?;
            nodes.insert(node_id, DataValue::new(variant).with_source_timestamp(now));
        }
        debug!(
            event = events::NODES_LOADED,
            component = COMPONENT,
            nodes = nodes.len(),
            "loaded static nodes"
        );

        Ok(Self {
            nodes: Mutex::new(nodes),
            registered: Mutex::new(HashMap::new()),
        })
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<NodeId, DataValue>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registered(&self) -> MutexGuard<'_, HashMap<MonitoredItemHandle, ReadValueId>> {
        self.registered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().keys().cloned().collect()
    }

    pub fn value(&self, node_id: &NodeId) -> Option<DataValue> {
        self.nodes().get(node_id).cloned()
    }

    /// Overwrites a known node. Returns `false` for unknown nodes.
    pub fn set_value(&self, node_id: &NodeId, value: impl Into<Variant>) -> bool {
        match self.nodes().get_mut(node_id) {
            Some(current) => {
                *current = DataValue::new(value).with_source_timestamp(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Steps every numeric node by one and flips every boolean node.
    ///
    /// Returns the nodes that changed; string and other values stay put.
    pub fn simulate_change(&self) -> Vec<NodeId> {
        let now = Utc::now();
        let mut changed = Vec::new();
        for (node_id, current) in self.nodes().iter_mut() {
            let next = match &current.value {
                Some(Variant::Boolean(value)) => Variant::Boolean(!value),
                Some(Variant::Int32(value)) => Variant::Int32(value.wrapping_add(1)),
                Some(Variant::UInt32(value)) => Variant::UInt32(value.wrapping_add(1)),
                Some(Variant::Int64(value)) => Variant::Int64(value.wrapping_add(1)),
                Some(Variant::Double(value)) => Variant::Double(value + 1.0),
                _ => continue,
            };
            *current = DataValue::new(next).with_source_timestamp(now);
            changed.push(node_id.clone());
        }
        debug!(
            event = events::NODES_CHANGED,
            component = COMPONENT,
            changed = changed.len(),
            "simulated node changes"
        );
        changed
    }

    /// Fresh samples for every registered monitored item watching one of
    /// `changed`, ready for `ServerSidePublishEngine::notify_data_change`.
    pub fn changed_item_values(&self, changed: &[NodeId]) -> Vec<(MonitoredItemHandle, DataValue)> {
        let watching: Vec<(MonitoredItemHandle, ReadValueId)> = self
            .registered()
            .iter()
            .filter(|(_, item)| changed.contains(&item.node_id))
            .map(|(handle, item)| (*handle, item.clone()))
            .collect();
        watching
            .into_iter()
            .map(|(handle, item)| (handle, self.sample_value(&item.node_id, item.attribute_id)))
            .collect()
    }
}

fn variant_from_json(value: &Value) -> Option<Variant> {
    match value {
        Value::Bool(value) => Some(Variant::Boolean(*value)),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Some(match i32::try_from(integer) {
                    Ok(small) => Variant::Int32(small),
                    Err(_) => Variant::Int64(integer),
                })
            } else {
                number.as_f64().map(Variant::Double)
            }
        }
        Value::String(text) => Some(Variant::String(text.clone())),
        _ => None,
    }
}

impl NodeManager for StaticNodeManager {
    fn sample_value(&self, node_id: &NodeId, attribute_id: AttributeId) -> DataValue {
        match attribute_id {
            AttributeId::Value => self
                .value(node_id)
                .unwrap_or_else(|| DataValue::default().with_status(StatusCode::BadNodeIdUnknown)),
            AttributeId::NodeId if self.nodes().contains_key(node_id) => {
                DataValue::new(node_id.to_string())
            }
            _ => DataValue::default().with_status(StatusCode::BadAttributeIdInvalid),
        }
    }

    fn validate(&self, item_to_monitor: &ReadValueId) -> StatusCode {
        if !self.nodes().contains_key(&item_to_monitor.node_id) {
            warn!(
                event = events::NODE_UNKNOWN,
                component = COMPONENT,
                node_id = %item_to_monitor.node_id,
                "monitored item for unknown node"
            );
            return StatusCode::BadNodeIdUnknown;
        }
        match item_to_monitor.attribute_id {
            AttributeId::Value | AttributeId::NodeId => StatusCode::Good,
            _ => StatusCode::BadAttributeIdInvalid,
        }
    }

    fn register_monitored_item(&self, handle: MonitoredItemHandle, item_to_monitor: &ReadValueId) {
        self.registered().insert(handle, item_to_monitor.clone());
    }

    fn unregister_monitored_item(&self, handle: MonitoredItemHandle) {
        self.registered().remove(&handle);
    }
}
