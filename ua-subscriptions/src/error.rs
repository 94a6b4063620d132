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

//! Configuration errors rejected synchronously at construction time.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("queue size must be at least 1, got {0}")]
    InvalidQueueSize(usize),

    #[error("sampling interval must not be negative, got {0} ms")]
    NegativeSamplingInterval(f64),

    #[error("publishing interval must be positive, got {0} ms")]
    InvalidPublishingInterval(f64),

    #[error("max keep-alive count must be at least 1")]
    ZeroKeepAliveCount,

    #[error("lifetime count {lifetime} is below three times the keep-alive count {keep_alive}")]
    LifetimeTooShort { lifetime: u32, keep_alive: u32 },

    #[error("invalid limit `{field}`: {reason}")]
    InvalidLimit {
        field: &'static str,
        reason: &'static str,
    },
}
