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

mod config;

use crate::config::{ClientConfig, Config};
use clap::Parser;
use static_node_manager::StaticNodeManager;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use ua_subscriptions::{
    CreateMonitoredItemsRequest, CreateSubscriptionRequest, MonitoredItemCreateRequest,
    MonitoringMode, MonitoringParameters, NodeId, PublishRequest, PublishResponse, ReadValueId,
    ServerSidePublishEngine, ServiceRequest, ServiceResponse, SubscriptionAcknowledgement,
    SubscriptionIdAllocator, SubscriptionService, TimestampsToReturn, TokioClock,
};

#[derive(Parser)]
#[command()]
struct ServerArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started ua-subscription-server");

    let args = ServerArgs::parse();
    let config = Config::load(&args.config)?;

    let node_manager = Arc::new(StaticNodeManager::from_file(&config.nodes.file_path)?);
    let clock = Arc::new(TokioClock::new(Handle::current()));
    let engine = ServerSidePublishEngine::new(
        config.client.session_id,
        config.engine.clone(),
        clock,
        node_manager.clone(),
        Arc::new(SubscriptionIdAllocator::default()),
    )?;

    let simulation = (config.nodes.change_period_ms > 0).then(|| {
        let node_manager = node_manager.clone();
        let engine = engine.clone();
        let period = Duration::from_millis(config.nodes.change_period_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let changed = node_manager.simulate_change();
                // Push-only items (sampling interval 0) learn about changes here.
                for (handle, value) in node_manager.changed_item_values(&changed) {
                    engine.notify_data_change(handle, value);
                }
            }
        })
    });

    let monitored_nodes = monitored_nodes(&config.client, &node_manager)?;
    let subscription_id = create_subscription(&engine, &config.client, &monitored_nodes).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received ctrl-c, shutting down"),
        outcome = publish_loop(&engine, &config.client, subscription_id) => outcome?,
    }

    engine.shutdown();
    if let Some(simulation) = simulation {
        simulation.abort();
    }
    Ok(())
}

fn monitored_nodes(
    client: &ClientConfig,
    node_manager: &StaticNodeManager,
) -> Result<Vec<NodeId>, Box<dyn Error>> {
    if client.monitored_nodes.is_empty() {
        return Ok(node_manager.node_ids());
    }
    client
        .monitored_nodes
        .iter()
        .map(|node| {
            node.parse::<NodeId>()
                .map_err(|status| format!("invalid monitored node '{node}': {status}").into())
        })
        .collect()
}

async fn create_subscription(
    engine: &ServerSidePublishEngine,
    client: &ClientConfig,
    monitored_nodes: &[NodeId],
) -> Result<u32, Box<dyn Error>> {
    let response = engine
        .call(
            1,
            ServiceRequest::CreateSubscription(CreateSubscriptionRequest {
                requested_publishing_interval: client.publishing_interval_ms,
                requested_lifetime_count: client.lifetime_count,
                requested_max_keep_alive_count: client.max_keep_alive_count,
                max_notifications_per_publish: client.max_notifications_per_publish,
                publishing_enabled: true,
                priority: 0,
            }),
        )
        .await;
    let ServiceResponse::CreateSubscription(created) = response else {
        return Err(format!("CreateSubscription failed: {}", response.service_result()).into());
    };
    info!(
        subscription_id = created.subscription_id,
        revised_publishing_interval_ms = created.revised_publishing_interval,
        revised_lifetime_count = created.revised_lifetime_count,
        revised_max_keep_alive_count = created.revised_max_keep_alive_count,
        "Created subscription"
    );

    let items_to_create = monitored_nodes
        .iter()
        .zip(1..)
        .map(|(node_id, client_handle)| MonitoredItemCreateRequest {
            item_to_monitor: ReadValueId::value_of(node_id.clone()),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle,
                sampling_interval: client.sampling_interval_ms,
                queue_size: client.queue_size,
                discard_oldest: true,
            },
        })
        .collect();
    let response = engine
        .call(
            2,
            ServiceRequest::CreateMonitoredItems(CreateMonitoredItemsRequest {
                subscription_id: created.subscription_id,
                timestamps_to_return: TimestampsToReturn::Both,
                items_to_create,
            }),
        )
        .await;
    let ServiceResponse::CreateMonitoredItems(items) = response else {
        return Err(format!("CreateMonitoredItems failed: {}", response.service_result()).into());
    };
    for (node_id, result) in monitored_nodes.iter().zip(&items.results) {
        if result.status_code.is_good() {
            debug!(
                node_id = %node_id,
                monitored_item_id = result.monitored_item_id,
                revised_sampling_interval_ms = result.revised_sampling_interval,
                "Monitoring node"
            );
        } else {
            warn!(node_id = %node_id, status = %result.status_code, "Unable to monitor node");
        }
    }

    Ok(created.subscription_id)
}

/// Keeps one Publish request outstanding, acknowledging every data message
/// with the next request.
async fn publish_loop(
    engine: &ServerSidePublishEngine,
    client: &ClientConfig,
    subscription_id: u32,
) -> Result<(), Box<dyn Error>> {
    let mut acknowledgements = Vec::new();
    let mut responses = 0u64;
    let mut request_handle = 100u32;

    loop {
        request_handle = request_handle.wrapping_add(1);
        let request = PublishRequest {
            request_handle,
            timeout_hint: client.publish_timeout_ms,
            subscription_acknowledgements: std::mem::take(&mut acknowledgements),
        };

        match engine.call(request_handle, ServiceRequest::Publish(request)).await {
            ServiceResponse::Publish(response) => {
                log_response(&response, client.log_json)?;
                if !response.notification_message.is_keep_alive() {
                    acknowledgements.push(SubscriptionAcknowledgement {
                        subscription_id: response.subscription_id,
                        sequence_number: response.notification_message.sequence_number,
                    });
                }
            }
            ServiceResponse::Fault(fault) => {
                warn!(
                    subscription_id,
                    request_handle = fault.request_handle,
                    status = %fault.service_result,
                    "Publish request faulted"
                );
                if fault.service_result.is_bad() && engine.subscription_count() == 0 {
                    return Err(format!("subscription gone: {}", fault.service_result).into());
                }
            }
            other => warn!(response = ?other, "Unexpected response to Publish"),
        }

        responses += 1;
        if client
            .max_publish_responses
            .is_some_and(|max_responses| responses >= max_responses)
        {
            info!(responses, "Reached configured number of Publish responses");
            return Ok(());
        }
    }
}

fn log_response(response: &PublishResponse, log_json: bool) -> Result<(), Box<dyn Error>> {
    if log_json {
        let json = serde_json::to_string(response)?;
        info!(response = %json, "Publish response");
        return Ok(());
    }
    let message = &response.notification_message;
    if message.is_keep_alive() {
        debug!(
            subscription_id = response.subscription_id,
            sequence_number = message.sequence_number,
            "Keep-alive"
        );
        return Ok(());
    }
    for notification in message.data_values() {
        info!(
            subscription_id = response.subscription_id,
            sequence_number = message.sequence_number,
            client_handle = notification.client_handle,
            value = ?notification.value.value,
            status = %notification.value.status,
            "Data change"
        );
    }
    if let Some(status) = message.status_change_code() {
        info!(
            subscription_id = response.subscription_id,
            status = %status,
            "Status change"
        );
    }
    Ok(())
}
