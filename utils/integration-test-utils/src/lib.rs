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

mod fake_deployment;
mod recording_sink;
mod sf_client;
mod test_plugins;

pub use fake_deployment::FakeDeployment;
pub use recording_sink::{PublishedRow, RecordingSink};
pub use sf_client::SerialForwarderTestClient;
pub use test_plugins::{
    echo_plugin_id, registry_with_echo_plugins, EchoPlugin, ECHO_PLUGIN_PREFIX, GARBAGE_MARKER,
};

use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber filtered by `RUST_LOG`; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
