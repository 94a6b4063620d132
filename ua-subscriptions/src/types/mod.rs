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

//! Decoded OPC-UA data structures consumed and produced by the engine.
//!
//! Binary encoding is handled by the transport; these types are the already
//! decoded form.

mod notification;
mod requests;

pub use notification::{
    DataChangeNotification, MonitoredItemNotification, NotificationData, NotificationMessage,
    StatusChangeNotification,
};
pub use requests::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse,
    DeleteSubscriptionsRequest, DeleteSubscriptionsResponse, ModifySubscriptionRequest,
    ModifySubscriptionResponse, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoringParameters, PublishRequest, PublishResponse, PublishResult, RepublishRequest,
    RepublishResponse, ServiceFault, SetMonitoringModeRequest, SetMonitoringModeResponse,
    SetPublishingModeRequest, SetPublishingModeResponse, SubscriptionAcknowledgement,
};

use crate::status::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node identifier in its numeric or string form.
///
/// Parses and prints the usual `ns=<namespace>;i=<id>` / `ns=<namespace>;s=<name>`
/// notation. The namespace prefix may be omitted for namespace 0.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeId {
    Numeric { namespace: u16, value: u32 },
    String { namespace: u16, value: String },
}

impl NodeId {
    pub fn numeric(namespace: u16, value: u32) -> Self {
        NodeId::Numeric { namespace, value }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        NodeId::String {
            namespace,
            value: value.into(),
        }
    }

    pub fn namespace(&self) -> u16 {
        match self {
            NodeId::Numeric { namespace, .. } | NodeId::String { namespace, .. } => *namespace,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Numeric { namespace, value } => write!(f, "ns={namespace};i={value}"),
            NodeId::String { namespace, value } => write!(f, "ns={namespace};s={value}"),
        }
    }
}

impl FromStr for NodeId {
    type Err = StatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, identifier) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, identifier) = rest.split_once(';').ok_or(StatusCode::BadNodeIdUnknown)?;
                let ns = ns.parse::<u16>().map_err(|_| StatusCode::BadNodeIdUnknown)?;
                (ns, identifier)
            }
            None => (0, s),
        };

        if let Some(value) = identifier.strip_prefix("i=") {
            let value = value.parse::<u32>().map_err(|_| StatusCode::BadNodeIdUnknown)?;
            Ok(NodeId::numeric(namespace, value))
        } else if let Some(value) = identifier.strip_prefix("s=") {
            Ok(NodeId::string(namespace, value))
        } else {
            Err(StatusCode::BadNodeIdUnknown)
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = StatusCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_string()
    }
}

/// Node attributes a monitored item may sample.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum AttributeId {
    NodeId,
    NodeClass,
    BrowseName,
    DisplayName,
    Description,
    #[default]
    Value,
    AccessLevel,
    MinimumSamplingInterval,
}

impl AttributeId {
    pub const fn id(self) -> u32 {
        match self {
            AttributeId::NodeId => 1,
            AttributeId::NodeClass => 2,
            AttributeId::BrowseName => 3,
            AttributeId::DisplayName => 4,
            AttributeId::Description => 5,
            AttributeId::Value => 13,
            AttributeId::AccessLevel => 17,
            AttributeId::MinimumSamplingInterval => 19,
        }
    }

    pub fn from_id(id: u32) -> Result<Self, StatusCode> {
        match id {
            1 => Ok(AttributeId::NodeId),
            2 => Ok(AttributeId::NodeClass),
            3 => Ok(AttributeId::BrowseName),
            4 => Ok(AttributeId::DisplayName),
            5 => Ok(AttributeId::Description),
            13 => Ok(AttributeId::Value),
            17 => Ok(AttributeId::AccessLevel),
            19 => Ok(AttributeId::MinimumSamplingInterval),
            _ => Err(StatusCode::BadAttributeIdInvalid),
        }
    }
}

/// Identifies what a monitored item samples.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct ReadValueId {
    pub node_id: NodeId,
    #[serde(default)]
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    pub fn value_of(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute_id: AttributeId::Value,
        }
    }
}

/// Scalar value carried by a [`DataValue`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    Double(f64),
    String(String),
    ByteString(Vec<u8>),
    DateTime(DateTime<Utc>),
    StatusCode(StatusCode),
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Boolean(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int32(value)
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::UInt32(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int64(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

/// A sampled value with its quality and timestamps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    pub fn with_server_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.server_timestamp = Some(timestamp);
        self
    }

    /// Compares value and status, ignoring timestamps.
    pub fn same_value(&self, other: &DataValue) -> bool {
        self.value == other.value && self.status == other.status
    }

    /// Fills absent timestamps; timestamps supplied by the caller are kept.
    pub(crate) fn stamp_missing(&mut self, now: DateTime<Utc>) {
        self.source_timestamp.get_or_insert(now);
        self.server_timestamp.get_or_insert(now);
    }

    pub(crate) fn filtered(&self, timestamps_to_return: TimestampsToReturn) -> DataValue {
        let mut value = self.clone();
        match timestamps_to_return {
            TimestampsToReturn::Source => value.server_timestamp = None,
            TimestampsToReturn::Server => value.source_timestamp = None,
            TimestampsToReturn::Both => {}
            TimestampsToReturn::Neither => {
                value.source_timestamp = None;
                value.server_timestamp = None;
            }
        }
        value
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum MonitoringMode {
    Disabled,
    Sampling,
    #[default]
    Reporting,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum TimestampsToReturn {
    Source,
    Server,
    #[default]
    Both,
    Neither,
}

/// Server-wide address of a monitored item.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemHandle {
    pub subscription_id: u32,
    pub monitored_item_id: u32,
}
