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
use crate::types::DataValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemNotification {
    pub client_handle: u32,
    pub value: DataValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataChangeNotification {
    pub monitored_items: Vec<MonitoredItemNotification>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeNotification {
    pub status: StatusCode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NotificationData {
    DataChange(DataChangeNotification),
    StatusChange(StatusChangeNotification),
}

impl NotificationData {
    /// Number of notifications this entry counts for against
    /// `maxNotificationsPerPublish`.
    pub fn len(&self) -> usize {
        match self {
            NotificationData::DataChange(data_change) => data_change.monitored_items.len(),
            NotificationData::StatusChange(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sequenced batch of notifications delivered in a Publish response.
///
/// A message without notification data is a keep-alive; its sequence number
/// is the next one the subscription will assign, not a consumed one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: DateTime<Utc>,
    pub notification_data: Vec<NotificationData>,
}

impl NotificationMessage {
    pub fn keep_alive(next_sequence_number: u32, publish_time: DateTime<Utc>) -> Self {
        Self {
            sequence_number: next_sequence_number,
            publish_time,
            notification_data: Vec::new(),
        }
    }

    pub fn status_change(
        sequence_number: u32,
        publish_time: DateTime<Utc>,
        status: StatusCode,
    ) -> Self {
        Self {
            sequence_number,
            publish_time,
            notification_data: vec![NotificationData::StatusChange(StatusChangeNotification {
                status,
            })],
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }

    pub fn notification_count(&self) -> usize {
        self.notification_data.iter().map(NotificationData::len).sum()
    }

    /// Status carried by the first status-change entry, if any.
    pub fn status_change_code(&self) -> Option<StatusCode> {
        self.notification_data.iter().find_map(|data| match data {
            NotificationData::StatusChange(change) => Some(change.status),
            NotificationData::DataChange(_) => None,
        })
    }

    /// Data values of every data-change entry in message order.
    pub fn data_values(&self) -> impl Iterator<Item = &MonitoredItemNotification> {
        self.notification_data
            .iter()
            .filter_map(|data| match data {
                NotificationData::DataChange(data_change) => Some(&data_change.monitored_items),
                NotificationData::StatusChange(_) => None,
            })
            .flatten()
    }
}
