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

//! Paging of large result arrays through opaque, single-use tokens.

use crate::observability::events;
use crate::status::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "continuation_points";

/// Opaque resumption token handed to the client.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct ContinuationPoint(Vec<u8>);

impl ContinuationPoint {
    fn mint() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ContinuationPoint {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ContinuationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One page of results plus the token for the rest, if anything remains.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub values: Vec<T>,
    pub continuation_point: Option<ContinuationPoint>,
}

struct Retained<T> {
    remaining: Vec<T>,
    max_elements: usize,
}

/// Token table retaining the unconsumed tail of each paged result.
///
/// Retained data lives until the last page is fetched or the token is
/// cancelled; callers own the duty to release tokens they abandon.
pub struct ContinuationPointManager<T> {
    max_continuation_points: usize,
    points: Mutex<HashMap<ContinuationPoint, Retained<T>>>,
}

impl<T> ContinuationPointManager<T> {
    /// `max_continuation_points` of 0 means unbounded.
    pub fn new(max_continuation_points: usize) -> Self {
        Self {
            max_continuation_points,
            points: Mutex::new(HashMap::new()),
        }
    }

    fn points(&self) -> MutexGuard<'_, HashMap<ContinuationPoint, Retained<T>>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the first page of `values`.
    ///
    /// With `max_elements` of 0, or not smaller than the array, everything is
    /// returned and no token is issued. Fails with `BadNoContinuationPoints`
    /// when a token is needed but the table is full.
    pub fn register(&self, max_elements: usize, mut values: Vec<T>) -> Result<Page<T>, StatusCode> {
        if max_elements == 0 || max_elements >= values.len() {
            return Ok(Page {
                values,
                continuation_point: None,
            });
        }

        let mut points = self.points();
        if self.max_continuation_points != 0 && points.len() >= self.max_continuation_points {
            warn!(
                event = events::CONTINUATION_POINT_EXHAUSTED,
                component = COMPONENT,
                retained = points.len(),
                "continuation point table full"
            );
            return Err(StatusCode::BadNoContinuationPoints);
        }

        let remaining = values.split_off(max_elements);
        let continuation_point = ContinuationPoint::mint();
        debug!(
            event = events::CONTINUATION_POINT_REGISTERED,
            component = COMPONENT,
            continuation_point = %continuation_point,
            remaining = remaining.len(),
            "registered continuation point"
        );
        points.insert(
            continuation_point.clone(),
            Retained {
                remaining,
                max_elements,
            },
        );

        Ok(Page {
            values,
            continuation_point: Some(continuation_point),
        })
    }

    /// Consumes `continuation_point` and returns the next page.
    ///
    /// The consumed token is invalid afterwards; a fresh one is issued only if
    /// more data remains.
    pub fn get_next(&self, continuation_point: &ContinuationPoint) -> Result<Page<T>, StatusCode> {
        let mut points = self.points();
        let Some(mut retained) = points.remove(continuation_point) else {
            debug!(
                event = events::CONTINUATION_POINT_INVALID,
                component = COMPONENT,
                continuation_point = %continuation_point,
                "unknown continuation point"
            );
            return Err(StatusCode::BadContinuationPointInvalid);
        };

        if retained.remaining.len() <= retained.max_elements {
            return Ok(Page {
                values: retained.remaining,
                continuation_point: None,
            });
        }

        let rest = retained.remaining.split_off(retained.max_elements);
        let page = std::mem::replace(&mut retained.remaining, rest);
        let next_point = ContinuationPoint::mint();
        points.insert(next_point.clone(), retained);

        Ok(Page {
            values: page,
            continuation_point: Some(next_point),
        })
    }

    /// Releases the token and its retained data. Returns whether it existed.
    pub fn cancel(&self, continuation_point: &ContinuationPoint) -> bool {
        let released = self.points().remove(continuation_point).is_some();
        if released {
            debug!(
                event = events::CONTINUATION_POINT_RELEASED,
                component = COMPONENT,
                continuation_point = %continuation_point,
                "released continuation point"
            );
        }
        released
    }

    /// Releases every outstanding token.
    pub fn clear(&self) {
        self.points().clear();
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
