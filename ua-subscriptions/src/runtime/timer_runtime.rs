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

//! Dedicated runtime driving timers when the caller has no tokio runtime.

use crate::observability::events;
use lazy_static::lazy_static;
use std::io;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, error};

const TIMER_RUNTIME_THREADS: usize = 2;
const TIMER_RUNTIME_THREAD_NAME: &str = "ua-sub-timers";
const COMPONENT: &str = "timer_runtime";

lazy_static! {
    static ref TIMER_RUNTIME: io::Result<Runtime> = build_timer_runtime();
}

fn build_timer_runtime() -> io::Result<Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TIMER_RUNTIME_THREADS)
        .thread_name(TIMER_RUNTIME_THREAD_NAME)
        .enable_all()
        .build();

    match &runtime {
        Ok(_) => debug!(
            event = events::RUNTIME_SPAWN_OK,
            component = COMPONENT,
            worker_threads = TIMER_RUNTIME_THREADS,
            "timer runtime started"
        ),
        Err(err) => error!(
            event = events::RUNTIME_SPAWN_FAILED,
            component = COMPONENT,
            err = %err,
            "unable to create timer runtime"
        ),
    }
    runtime
}

pub(crate) fn handle() -> io::Result<Handle> {
    match &*TIMER_RUNTIME {
        Ok(runtime) => Ok(runtime.handle().clone()),
        Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
    }
}
