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

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::Path;
use ua_subscriptions::SubscriptionLimits;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) engine: SubscriptionLimits,
    pub(crate) nodes: NodesConfig,
    pub(crate) client: ClientConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct NodesConfig {
    pub(crate) file_path: String,
    /// Period of simulated value changes; 0 keeps the values static.
    #[serde(default)]
    pub(crate) change_period_ms: u64,
}

/// The loopback client that exercises the engine from inside the process.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub(crate) session_id: u32,
    pub(crate) publishing_interval_ms: f64,
    pub(crate) lifetime_count: u32,
    pub(crate) max_keep_alive_count: u32,
    #[serde(default)]
    pub(crate) max_notifications_per_publish: u32,
    pub(crate) sampling_interval_ms: f64,
    pub(crate) queue_size: u32,
    /// Publish timeout hint; 0 waits indefinitely.
    #[serde(default)]
    pub(crate) publish_timeout_ms: u32,
    /// Nodes to monitor; empty monitors every node of the node file.
    #[serde(default)]
    pub(crate) monitored_nodes: Vec<String>,
    /// Stop after this many Publish responses.
    #[serde(default)]
    pub(crate) max_publish_responses: Option<u64>,
    /// Log every Publish response as a JSON document.
    #[serde(default)]
    pub(crate) log_json: bool,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        let config: Config = json5::from_str(&contents)?;
        config.engine.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn bundled_config_loads() {
        let config = Config::load("config/server.json5").expect("bundled config");
        assert_eq!(config.client.session_id, 1);
        assert!(config.nodes.file_path.ends_with("nodes.json"));
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let parsed = json5::from_str::<Config>(
            r#"{
                nodes: { file_path: "nodes.json" },
                client: {
                    session_id: 1,
                    publishing_interval_ms: 500,
                    lifetime_count: 30,
                    max_keep_alive_count: 10,
                    sampling_interval_ms: 100,
                    queue_size: 1,
                },
                transports: {},
            }"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn nan_engine_limit_fails_validation() {
        let config = json5::from_str::<Config>(
            r#"{
                engine: { min_sampling_interval_ms: NaN },
                nodes: { file_path: "nodes.json" },
                client: {
                    session_id: 1,
                    publishing_interval_ms: 500,
                    lifetime_count: 30,
                    max_keep_alive_count: 10,
                    sampling_interval_ms: 100,
                    queue_size: 1,
                },
            }"#,
        )
        .expect("json5 accepts NaN");
        assert!(config.engine.validate().is_err());
    }
}
