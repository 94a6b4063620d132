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

//! Server-side limits applied when revising client-requested parameters.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Limits for one publish engine (one session).
///
/// Every field has a default so configuration files only need to name the
/// values they change.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SubscriptionLimits {
    pub min_publishing_interval_ms: f64,
    pub max_publishing_interval_ms: f64,
    /// Used when a client requests a keep-alive count of 0.
    pub default_keep_alive_count: u32,
    pub max_keep_alive_count: u32,
    pub max_lifetime_count: u32,
    pub min_sampling_interval_ms: f64,
    pub max_sampling_interval_ms: f64,
    pub max_queue_size: u32,
    /// 0 leaves the client's value untouched.
    pub max_notifications_per_publish: u32,
    pub max_pending_notifications: usize,
    pub max_subscriptions_per_session: usize,
    pub max_monitored_items_per_subscription: usize,
    pub max_pending_publish_requests: usize,
    pub max_continuation_points: usize,
}

impl Default for SubscriptionLimits {
    fn default() -> Self {
        Self {
            min_publishing_interval_ms: 50.0,
            max_publishing_interval_ms: 3_600_000.0,
            default_keep_alive_count: 10,
            max_keep_alive_count: 30_000,
            max_lifetime_count: 90_000,
            min_sampling_interval_ms: 50.0,
            max_sampling_interval_ms: 3_600_000.0,
            max_queue_size: 1_000,
            max_notifications_per_publish: 0,
            max_pending_notifications: 100,
            max_subscriptions_per_session: 100,
            max_monitored_items_per_subscription: 1_000,
            max_pending_publish_requests: 10,
            max_continuation_points: 16,
        }
    }
}

impl SubscriptionLimits {
    /// Rejects limit tables that would make revision inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_publishing_interval_ms.is_nan() || self.min_publishing_interval_ms <= 0.0 {
            return Err(ConfigError::InvalidLimit {
                field: "min_publishing_interval_ms",
                reason: "must be positive",
            });
        }
        if self.max_publishing_interval_ms.is_nan() {
            return Err(ConfigError::InvalidLimit {
                field: "max_publishing_interval_ms",
                reason: "must be a number",
            });
        }
        if self.max_publishing_interval_ms < self.min_publishing_interval_ms {
            return Err(ConfigError::InvalidLimit {
                field: "max_publishing_interval_ms",
                reason: "must not be below min_publishing_interval_ms",
            });
        }
        if self.max_keep_alive_count == 0 {
            return Err(ConfigError::ZeroKeepAliveCount);
        }
        if self.default_keep_alive_count == 0
            || self.default_keep_alive_count > self.max_keep_alive_count
        {
            return Err(ConfigError::InvalidLimit {
                field: "default_keep_alive_count",
                reason: "must be within 1..=max_keep_alive_count",
            });
        }
        if u64::from(self.max_lifetime_count) < 3 * u64::from(self.max_keep_alive_count) {
            return Err(ConfigError::LifetimeTooShort {
                lifetime: self.max_lifetime_count,
                keep_alive: self.max_keep_alive_count,
            });
        }
        if !self.min_sampling_interval_ms.is_finite() {
            return Err(ConfigError::InvalidLimit {
                field: "min_sampling_interval_ms",
                reason: "must be finite",
            });
        }
        if self.min_sampling_interval_ms < 0.0 {
            return Err(ConfigError::NegativeSamplingInterval(
                self.min_sampling_interval_ms,
            ));
        }
        if self.max_sampling_interval_ms.is_nan() {
            return Err(ConfigError::InvalidLimit {
                field: "max_sampling_interval_ms",
                reason: "must be a number",
            });
        }
        if self.max_sampling_interval_ms < self.min_sampling_interval_ms {
            return Err(ConfigError::InvalidLimit {
                field: "max_sampling_interval_ms",
                reason: "must not be below min_sampling_interval_ms",
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidQueueSize(0));
        }
        if self.max_pending_publish_requests == 0 {
            return Err(ConfigError::InvalidLimit {
                field: "max_pending_publish_requests",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriptionLimits;
    use crate::error::ConfigError;

    #[test]
    fn defaults_are_consistent() {
        assert_eq!(SubscriptionLimits::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_short_lifetime_ceiling() {
        let limits = SubscriptionLimits {
            max_keep_alive_count: 100,
            max_lifetime_count: 200,
            ..Default::default()
        };

        assert_eq!(
            limits.validate(),
            Err(ConfigError::LifetimeTooShort {
                lifetime: 200,
                keep_alive: 100
            })
        );
    }

    #[test]
    fn validate_rejects_zero_publish_backlog() {
        let limits = SubscriptionLimits {
            max_pending_publish_requests: 0,
            ..Default::default()
        };

        assert!(matches!(
            limits.validate(),
            Err(ConfigError::InvalidLimit {
                field: "max_pending_publish_requests",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_nan_interval_limits() {
        let cases = [
            (
                SubscriptionLimits {
                    min_sampling_interval_ms: f64::NAN,
                    ..Default::default()
                },
                "min_sampling_interval_ms",
            ),
            (
                SubscriptionLimits {
                    min_sampling_interval_ms: f64::INFINITY,
                    ..Default::default()
                },
                "min_sampling_interval_ms",
            ),
            (
                SubscriptionLimits {
                    max_sampling_interval_ms: f64::NAN,
                    ..Default::default()
                },
                "max_sampling_interval_ms",
            ),
            (
                SubscriptionLimits {
                    max_publishing_interval_ms: f64::NAN,
                    ..Default::default()
                },
                "max_publishing_interval_ms",
            ),
        ];

        for (limits, expected) in cases {
            match limits.validate() {
                Err(ConfigError::InvalidLimit { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let limits: SubscriptionLimits =
            serde_json::from_str(r#"{ "max_pending_publish_requests": 3 }"#)
                .expect("partial limits should parse");

        assert_eq!(limits.max_pending_publish_requests, 3);
        assert_eq!(
            limits.max_keep_alive_count,
            SubscriptionLimits::default().max_keep_alive_count
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<SubscriptionLimits>(r#"{ "max_bananas": 3 }"#);
        assert!(parsed.is_err());
    }
}
