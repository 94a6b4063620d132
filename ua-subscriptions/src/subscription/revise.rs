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

//! Server-side revision of client-requested parameters.

use crate::config::SubscriptionLimits;
use crate::types::{CreateSubscriptionRequest, ModifySubscriptionRequest};

/// Parameters a subscription runs with after revision.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionParameters {
    /// Milliseconds between publishing cycles.
    pub publishing_interval: f64,
    pub lifetime_count: u32,
    pub max_keep_alive_count: u32,
    /// 0 means unlimited.
    pub max_notifications_per_publish: u32,
    pub priority: u8,
    pub publishing_enabled: bool,
}

impl SubscriptionParameters {
    pub fn revised(request: &CreateSubscriptionRequest, limits: &SubscriptionLimits) -> Self {
        let max_keep_alive_count =
            revise_keep_alive_count(request.requested_max_keep_alive_count, limits);
        Self {
            publishing_interval: revise_publishing_interval(
                request.requested_publishing_interval,
                limits,
            ),
            lifetime_count: revise_lifetime_count(
                request.requested_lifetime_count,
                max_keep_alive_count,
                limits,
            ),
            max_keep_alive_count,
            max_notifications_per_publish: revise_max_notifications(
                request.max_notifications_per_publish,
                limits,
            ),
            priority: request.priority,
            publishing_enabled: request.publishing_enabled,
        }
    }

    /// Revision of a ModifySubscription request; the publishing mode is kept.
    pub fn revised_modification(
        &self,
        request: &ModifySubscriptionRequest,
        limits: &SubscriptionLimits,
    ) -> Self {
        let max_keep_alive_count =
            revise_keep_alive_count(request.requested_max_keep_alive_count, limits);
        Self {
            publishing_interval: revise_publishing_interval(
                request.requested_publishing_interval,
                limits,
            ),
            lifetime_count: revise_lifetime_count(
                request.requested_lifetime_count,
                max_keep_alive_count,
                limits,
            ),
            max_keep_alive_count,
            max_notifications_per_publish: revise_max_notifications(
                request.max_notifications_per_publish,
                limits,
            ),
            priority: request.priority,
            publishing_enabled: self.publishing_enabled,
        }
    }
}

fn revise_publishing_interval(requested: f64, limits: &SubscriptionLimits) -> f64 {
    if !requested.is_finite() || requested < limits.min_publishing_interval_ms {
        limits.min_publishing_interval_ms
    } else {
        requested.min(limits.max_publishing_interval_ms)
    }
}

fn revise_keep_alive_count(requested: u32, limits: &SubscriptionLimits) -> u32 {
    match requested {
        0 => limits.default_keep_alive_count,
        count => count.min(limits.max_keep_alive_count),
    }
}

// Raised to three keep-alive periods before the ceiling is applied.
fn revise_lifetime_count(requested: u32, keep_alive_count: u32, limits: &SubscriptionLimits) -> u32 {
    requested
        .max(keep_alive_count.saturating_mul(3))
        .min(limits.max_lifetime_count)
}

fn revise_max_notifications(requested: u32, limits: &SubscriptionLimits) -> u32 {
    let ceiling = limits.max_notifications_per_publish;
    if ceiling != 0 && (requested == 0 || requested > ceiling) {
        ceiling
    } else {
        requested
    }
}

/// Negative picks the publishing interval; 0 stays 0 (no periodic sampling).
pub(crate) fn revise_sampling_interval(
    requested: f64,
    publishing_interval: f64,
    limits: &SubscriptionLimits,
) -> f64 {
    let requested = if requested < 0.0 || requested.is_nan() {
        publishing_interval
    } else {
        requested
    };
    if requested == 0.0 {
        return 0.0;
    }
    requested.clamp(limits.min_sampling_interval_ms, limits.max_sampling_interval_ms)
}

pub(crate) fn revise_queue_size(requested: u32, limits: &SubscriptionLimits) -> u32 {
    requested.clamp(1, limits.max_queue_size)
}

#[cfg(test)]
mod tests {
    use super::{revise_queue_size, revise_sampling_interval, SubscriptionParameters};
    use crate::config::SubscriptionLimits;
    use crate::types::{CreateSubscriptionRequest, ModifySubscriptionRequest};

    #[test]
    fn lifetime_is_raised_to_three_keep_alives() {
        let request = CreateSubscriptionRequest {
            requested_lifetime_count: 5,
            requested_max_keep_alive_count: 10,
            ..Default::default()
        };

        let revised = SubscriptionParameters::revised(&request, &SubscriptionLimits::default());

        assert_eq!(revised.max_keep_alive_count, 10);
        assert_eq!(revised.lifetime_count, 30);
    }

    #[test]
    fn zero_keep_alive_uses_default_and_large_is_capped() {
        let limits = SubscriptionLimits {
            default_keep_alive_count: 7,
            max_keep_alive_count: 100,
            max_lifetime_count: 300,
            ..Default::default()
        };

        let zero = CreateSubscriptionRequest {
            requested_max_keep_alive_count: 0,
            ..Default::default()
        };
        assert_eq!(
            SubscriptionParameters::revised(&zero, &limits).max_keep_alive_count,
            7
        );

        let huge = CreateSubscriptionRequest {
            requested_max_keep_alive_count: 5_000,
            requested_lifetime_count: 90_000,
            ..Default::default()
        };
        let revised = SubscriptionParameters::revised(&huge, &limits);
        assert_eq!(revised.max_keep_alive_count, 100);
        assert_eq!(revised.lifetime_count, 300);
    }

    #[test]
    fn publishing_interval_is_clamped() {
        let limits = SubscriptionLimits::default();
        for (requested, expected) in [
            (-1.0, 50.0),
            (0.0, 50.0),
            (f64::NAN, 50.0),
            (250.0, 250.0),
            (1.0e9, 3_600_000.0),
        ] {
            let request = CreateSubscriptionRequest {
                requested_publishing_interval: requested,
                ..Default::default()
            };
            assert_eq!(
                SubscriptionParameters::revised(&request, &limits).publishing_interval,
                expected,
                "requested {requested}"
            );
        }
    }

    #[test]
    fn max_notifications_respects_server_ceiling() {
        let limits = SubscriptionLimits {
            max_notifications_per_publish: 50,
            ..Default::default()
        };
        let unlimited = CreateSubscriptionRequest::default();
        assert_eq!(
            SubscriptionParameters::revised(&unlimited, &limits).max_notifications_per_publish,
            50
        );

        let small = CreateSubscriptionRequest {
            max_notifications_per_publish: 5,
            ..Default::default()
        };
        assert_eq!(
            SubscriptionParameters::revised(&small, &limits).max_notifications_per_publish,
            5
        );
    }

    #[test]
    fn modification_keeps_publishing_mode() {
        let limits = SubscriptionLimits::default();
        let created = SubscriptionParameters::revised(
            &CreateSubscriptionRequest {
                publishing_enabled: false,
                ..Default::default()
            },
            &limits,
        );

        let modified = created.revised_modification(
            &ModifySubscriptionRequest {
                subscription_id: 1,
                requested_publishing_interval: 500.0,
                requested_lifetime_count: 60,
                requested_max_keep_alive_count: 20,
                max_notifications_per_publish: 0,
                priority: 3,
            },
            &limits,
        );

        assert!(!modified.publishing_enabled);
        assert_eq!(modified.publishing_interval, 500.0);
        assert_eq!(modified.priority, 3);
    }

    #[test]
    fn sampling_interval_revision() {
        let limits = SubscriptionLimits::default();
        assert_eq!(revise_sampling_interval(-1.0, 1000.0, &limits), 1000.0);
        assert_eq!(revise_sampling_interval(0.0, 1000.0, &limits), 0.0);
        assert_eq!(revise_sampling_interval(10.0, 1000.0, &limits), 50.0);
        assert_eq!(revise_sampling_interval(1.0e12, 1000.0, &limits), 3_600_000.0);
    }

    #[test]
    fn queue_size_revision() {
        let limits = SubscriptionLimits {
            max_queue_size: 10,
            ..Default::default()
        };
        assert_eq!(revise_queue_size(0, &limits), 1);
        assert_eq!(revise_queue_size(4, &limits), 4);
        assert_eq!(revise_queue_size(500, &limits), 10);
    }
}
