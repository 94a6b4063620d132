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

/// Numbers the notification messages of one subscription.
///
/// Starts at 1 and wraps back to 1 after `max`; 0 is never produced.
#[derive(Clone, Debug)]
pub struct SequenceNumberGenerator {
    current: u32,
    max: u32,
}

impl Default for SequenceNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceNumberGenerator {
    pub fn new() -> Self {
        Self::with_max(u32::MAX)
    }

    /// Generator wrapping after `max` instead of `u32::MAX`. A `max` of 0 is
    /// treated as 1.
    pub fn with_max(max: u32) -> Self {
        Self {
            current: 1,
            max: max.max(1),
        }
    }

    /// Returns the current value and advances.
    pub fn next_value(&mut self) -> u32 {
        let value = self.current;
        self.current = if self.current >= self.max {
            1
        } else {
            self.current + 1
        };
        value
    }

    /// The value the next call to [`next_value`](Self::next_value) returns.
    pub fn future_value(&self) -> u32 {
        self.current
    }
}
