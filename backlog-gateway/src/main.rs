/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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
mod sink;

use crate::config::Config;
use crate::sink::TracingSink;
use backlog_broker::{BacklogWrapper, DeploymentRegistry, PluginRegistry};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command()]
struct GatewayArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started backlog-gateway");

    let args = GatewayArgs::parse();
    let contents = std::fs::read_to_string(&args.config)
        .map_err(|e| format!("Unable to read config file {}: {e}", args.config))?;
    let config = Config::from_json5(&contents)
        .map_err(|e| format!("Unable to parse config file {}: {e}", args.config))?;

    let settings = config.deployment_settings.build_source()?;
    let registry = Arc::new(DeploymentRegistry::new(config.broker.clone()));
    let plugins = Arc::new(PluginRegistry::with_builtin());
    info!("available plugins: {:?}", plugins.identifiers());

    let mut wrappers = Vec::with_capacity(config.wrappers.len());
    for wrapper_config in config.wrappers {
        let name = wrapper_config.virtual_sensor_name.clone();
        let mut wrapper = BacklogWrapper::new(
            wrapper_config,
            registry.clone(),
            settings.clone(),
            plugins.clone(),
            Arc::new(TracingSink::new(name.as_str())),
        );
        match wrapper.start().await {
            Ok(()) => {
                if let Some(addr) = wrapper.relay_addr() {
                    info!("{name}: serial-forwarder relay listening on {addr}");
                }
                wrappers.push(wrapper);
            }
            Err(err) => error!("{name}: unable to start wrapper: {err}"),
        }
    }

    if wrappers.is_empty() {
        warn!("no wrapper started; exiting");
        return Ok(());
    }
    info!(
        "{} wrapper(s) active on deployments {:?}",
        wrappers.len(),
        registry.active_deployments().await
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for wrapper in wrappers.iter_mut() {
        if let Err(err) = wrapper.stop().await {
            warn!(
                "{}: wrapper did not stop cleanly: {err}",
                wrapper.virtual_sensor_name()
            );
        }
    }
    info!("registry stats at exit: {:?}", registry.stats());

    Ok(())
}
