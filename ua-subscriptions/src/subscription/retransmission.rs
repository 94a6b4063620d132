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

use crate::types::NotificationMessage;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct SentMessage {
    message: NotificationMessage,
    sent_at: Instant,
}

/// Sent messages retained for Republish, in send order.
#[derive(Default)]
pub(crate) struct RetransmissionQueue {
    entries: VecDeque<SentMessage>,
}

impl RetransmissionQueue {
    pub(crate) fn push(&mut self, message: NotificationMessage, sent_at: Instant) {
        self.entries.push_back(SentMessage { message, sent_at });
    }

    /// Removes the entry; `false` if it was not retained.
    pub(crate) fn acknowledge(&mut self, sequence_number: u32) -> bool {
        match self
            .entries
            .iter()
            .position(|entry| entry.message.sequence_number == sequence_number)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn get(&self, sequence_number: u32) -> Option<&NotificationMessage> {
        self.entries
            .iter()
            .map(|entry| &entry.message)
            .find(|message| message.sequence_number == sequence_number)
    }

    /// Drops entries retained for at least `max_age`; returns their numbers.
    pub(crate) fn purge_older_than(&mut self, now: Instant, max_age: Duration) -> Vec<u32> {
        let mut purged = Vec::new();
        while let Some(oldest) = self.entries.front() {
            if now.saturating_duration_since(oldest.sent_at) < max_age {
                break;
            }
            purged.push(oldest.message.sequence_number);
            self.entries.pop_front();
        }
        purged
    }

    pub(crate) fn available_sequence_numbers(&self) -> Vec<u32> {
        self.entries
            .iter()
            .map(|entry| entry.message.sequence_number)
            .collect()
    }

    /// Restarts every retention period at `now`.
    pub(crate) fn restamp(&mut self, now: Instant) {
        for entry in &mut self.entries {
            entry.sent_at = now;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
