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

//! Canonical structured field keys and value-format helpers.

use crate::types::{NotificationMessage, ReadValueId};

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const SESSION_ID: &str = "session_id";
pub const SUBSCRIPTION_ID: &str = "subscription_id";
pub const MONITORED_ITEM_ID: &str = "monitored_item_id";
pub const SEQUENCE_NUMBER: &str = "sequence_number";
pub const REQUEST_HANDLE: &str = "request_handle";
pub const STATUS: &str = "status";
pub const PENDING: &str = "pending";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";
pub const REASON_QUEUE_FULL: &str = "queue_full";
pub const REASON_RECEIVER_GONE: &str = "receiver_gone";
pub const REASON_SESSION_CLOSED: &str = "session_closed";

/// Renders a list of sequence numbers compactly, e.g. `[3,4,7]`.
pub fn format_sequence_numbers(sequence_numbers: &[u32]) -> String {
    let joined = sequence_numbers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}

/// `ns=2;i=1001#13` style label of a monitored attribute.
pub fn format_read_value_id(read_value_id: &ReadValueId) -> String {
    format!(
        "{}#{}",
        read_value_id.node_id,
        read_value_id.attribute_id.id()
    )
}

/// Short description of a message: `keepalive` or the notification count.
pub fn format_message_kind(message: &NotificationMessage) -> String {
    if message.is_keep_alive() {
        "keepalive".to_string()
    } else if let Some(status) = message.status_change_code() {
        format!("status_change:{status}")
    } else {
        format!("data_change:{}", message.notification_count())
    }
}

#[cfg(test)]
mod tests {
    use super::{format_message_kind, format_read_value_id, format_sequence_numbers};
    use crate::status::StatusCode;
    use crate::types::{NodeId, NotificationMessage, ReadValueId};
    use chrono::Utc;

    #[test]
    fn sequence_numbers_render_compactly() {
        assert_eq!(format_sequence_numbers(&[]), "[]");
        assert_eq!(format_sequence_numbers(&[3, 4, 7]), "[3,4,7]");
    }

    #[test]
    fn read_value_id_includes_attribute() {
        let read_value_id = ReadValueId::value_of(NodeId::numeric(2, 1001));
        assert_eq!(format_read_value_id(&read_value_id), "ns=2;i=1001#13");
    }

    #[test]
    fn message_kind_distinguishes_keepalive_and_status() {
        let now = Utc::now();
        assert_eq!(
            format_message_kind(&NotificationMessage::keep_alive(5, now)),
            "keepalive"
        );
        assert_eq!(
            format_message_kind(&NotificationMessage::status_change(
                5,
                now,
                StatusCode::BadTimeout
            )),
            "status_change:BadTimeout"
        );
    }
}
