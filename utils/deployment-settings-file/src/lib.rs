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

use backlog_broker::{DeploymentId, DeploymentSettings, DeploymentSettingsSource, SettingsError};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

const SETTINGS_EXTENSION: &str = "json5";

/// Reads `<dir>/<deployment>.json5` on first lookup and keeps the result for
/// the lifetime of the source. Failed reads are not cached.
pub struct DeploymentSettingsFile {
    dir: PathBuf,
    cache: Mutex<HashMap<DeploymentId, DeploymentSettings>>,
}

impl DeploymentSettingsFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DeploymentSettingsFile {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn settings_path(&self, deployment: &DeploymentId) -> PathBuf {
        self.dir
            .join(format!("{}.{SETTINGS_EXTENSION}", deployment.as_str()))
    }

    fn load(&self, deployment: &DeploymentId) -> Result<DeploymentSettings, SettingsError> {
        let path = self.settings_path(deployment);
        debug!("loading deployment settings from {path:?}");

        let data = fs::read_to_string(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => SettingsError::NotFound(deployment.clone()),
            _ => SettingsError::Unreadable {
                deployment: deployment.clone(),
                reason: format!("{}: {err}", path.display()),
            },
        })?;

        let settings: DeploymentSettings =
            json5::from_str(&data).map_err(|err| SettingsError::Unreadable {
                deployment: deployment.clone(),
                reason: format!("{}: {err}", path.display()),
            })?;

        if settings.address.trim().is_empty() {
            return Err(SettingsError::MissingAddress(deployment.clone()));
        }
        Ok(settings)
    }
}

impl DeploymentSettingsSource for DeploymentSettingsFile {
    fn deployment_settings(
        &self,
        deployment: &DeploymentId,
    ) -> Result<DeploymentSettings, SettingsError> {
        if let Some(settings) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(deployment)
        {
            return Ok(settings.clone());
        }

        let settings = self.load(deployment).inspect_err(|err| {
            warn!("deployment settings unavailable: {err}");
        })?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(deployment.clone(), settings.clone());
        Ok(settings)
    }
}
