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

//! OPC-UA status codes surfaced by the subscription services.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subset of OPC-UA status codes used at the subscription service boundary.
///
/// The `Display` form is the exact OPC-UA symbolic name,
/// so the value can be logged or compared against other stacks verbatim.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum StatusCode {
    #[default]
    Good,
    GoodSubscriptionTransferred,
    BadNoSubscription,
    BadTooManyPublishRequests,
    BadSubscriptionIdInvalid,
    BadContinuationPointInvalid,
    BadNoContinuationPoints,
    BadSequenceNumberUnknown,
    BadMessageNotAvailable,
    BadMonitoredItemIdInvalid,
    BadMonitoringModeInvalid,
    BadTooManySubscriptions,
    BadTooManyMonitoredItems,
    BadNothingToDo,
    BadTimeout,
    BadSessionClosed,
    BadNodeIdUnknown,
    BadAttributeIdInvalid,
    BadInvalidArgument,
    BadWaitingForInitialData,
}

impl StatusCode {
    /// Numeric value of the code as carried on the wire.
    pub const fn bits(self) -> u32 {
        match self {
            StatusCode::Good => 0x0000_0000,
            StatusCode::GoodSubscriptionTransferred => 0x002D_0000,
            StatusCode::BadNoSubscription => 0x8079_0000,
            StatusCode::BadTooManyPublishRequests => 0x8078_0000,
            StatusCode::BadSubscriptionIdInvalid => 0x8028_0000,
            StatusCode::BadContinuationPointInvalid => 0x804A_0000,
            StatusCode::BadNoContinuationPoints => 0x804B_0000,
            StatusCode::BadSequenceNumberUnknown => 0x807A_0000,
            StatusCode::BadMessageNotAvailable => 0x807B_0000,
            StatusCode::BadMonitoredItemIdInvalid => 0x8042_0000,
            StatusCode::BadMonitoringModeInvalid => 0x8041_0000,
            StatusCode::BadTooManySubscriptions => 0x8077_0000,
            StatusCode::BadTooManyMonitoredItems => 0x80DB_0000,
            StatusCode::BadNothingToDo => 0x800F_0000,
            StatusCode::BadTimeout => 0x800A_0000,
            StatusCode::BadSessionClosed => 0x8026_0000,
            StatusCode::BadNodeIdUnknown => 0x8034_0000,
            StatusCode::BadAttributeIdInvalid => 0x8035_0000,
            StatusCode::BadInvalidArgument => 0x80AB_0000,
            StatusCode::BadWaitingForInitialData => 0x8032_0000,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StatusCode::Good => "Good",
            StatusCode::GoodSubscriptionTransferred => "GoodSubscriptionTransferred",
            StatusCode::BadNoSubscription => "BadNoSubscription",
            StatusCode::BadTooManyPublishRequests => "BadTooManyPublishRequests",
            StatusCode::BadSubscriptionIdInvalid => "BadSubscriptionIdInvalid",
            StatusCode::BadContinuationPointInvalid => "BadContinuationPointInvalid",
            StatusCode::BadNoContinuationPoints => "BadNoContinuationPoints",
            StatusCode::BadSequenceNumberUnknown => "BadSequenceNumberUnknown",
            StatusCode::BadMessageNotAvailable => "BadMessageNotAvailable",
            StatusCode::BadMonitoredItemIdInvalid => "BadMonitoredItemIdInvalid",
            StatusCode::BadMonitoringModeInvalid => "BadMonitoringModeInvalid",
            StatusCode::BadTooManySubscriptions => "BadTooManySubscriptions",
            StatusCode::BadTooManyMonitoredItems => "BadTooManyMonitoredItems",
            StatusCode::BadNothingToDo => "BadNothingToDo",
            StatusCode::BadTimeout => "BadTimeout",
            StatusCode::BadSessionClosed => "BadSessionClosed",
            StatusCode::BadNodeIdUnknown => "BadNodeIdUnknown",
            StatusCode::BadAttributeIdInvalid => "BadAttributeIdInvalid",
            StatusCode::BadInvalidArgument => "BadInvalidArgument",
            StatusCode::BadWaitingForInitialData => "BadWaitingForInitialData",
        }
    }

    /// Severity bits `00`.
    pub const fn is_good(self) -> bool {
        self.bits() & 0xC000_0000 == 0
    }

    /// Severity bits `10`.
    pub const fn is_bad(self) -> bool {
        self.bits() & 0x8000_0000 != 0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for StatusCode {}

#[cfg(test)]
mod tests {
    use super::StatusCode;

    #[test]
    fn display_uses_symbolic_names() {
        assert_eq!(StatusCode::BadNoSubscription.to_string(), "BadNoSubscription");
        assert_eq!(
            StatusCode::GoodSubscriptionTransferred.to_string(),
            "GoodSubscriptionTransferred"
        );
        assert_eq!(
            StatusCode::BadContinuationPointInvalid.to_string(),
            "BadContinuationPointInvalid"
        );
    }

    #[test]
    fn severity_follows_top_bits() {
        assert!(StatusCode::Good.is_good());
        assert!(StatusCode::GoodSubscriptionTransferred.is_good());
        assert!(!StatusCode::GoodSubscriptionTransferred.is_bad());
        assert!(StatusCode::BadTooManyPublishRequests.is_bad());
        assert!(!StatusCode::BadTimeout.is_good());
    }
}
