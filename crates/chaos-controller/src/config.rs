// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{Error, Result};
use chaos_router::FanoutPolicy;
use chaos_selector::{NamespacePolicy, Scope};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

const SANITIZER_NAME: &str = "ControllerConfigSanitizer";

pub const DEFAULT_PAUSE_IMAGE: &str = "gcr.io/google-containers/pause:latest";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Whether experiments may target every namespace, or only
    /// `target_namespace`.
    pub cluster_scoped: bool,
    pub target_namespace: String,
    /// Regex of the namespaces experiments may target. Mutually exclusive
    /// with `ignored_namespaces`.
    pub allowed_namespaces: Option<String>,
    /// Regex of the namespaces experiments must never target.
    pub ignored_namespaces: Option<String>,
    pub fanout_policy: FanoutPolicy,
    pub reconcile_interval_secs: u64,
    pub max_concurrent_reconciles: usize,
    /// Image swapped into containers by pod-failure experiments.
    pub pause_image: String,
    pub logger: LoggerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_scoped: true,
            target_namespace: "default".to_string(),
            allowed_namespaces: None,
            ignored_namespaces: None,
            fanout_policy: FanoutPolicy::BestEffort,
            reconcile_interval_secs: 10,
            max_concurrent_reconciles: 8,
            pause_image: DEFAULT_PAUSE_IMAGE.to_string(),
            logger: LoggerConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Load the config from disk at the given path
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_string = path.as_ref().display().to_string();
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|e| Error::IO(path_string.clone(), e))?;
        Self::parse_serialized_config(&contents).map_err(|e| match e {
            Error::Yaml(_, source) => Error::Yaml(path_string, source),
            other => other,
        })
    }

    /// Parse the config from the serialized string
    pub fn parse_serialized_config(serialized_config: &str) -> Result<Self> {
        serde_yaml::from_str(serialized_config).map_err(|e| Error::Yaml("config".to_string(), e))
    }

    /// Validate the config
    pub fn sanitize(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::ConfigSanitizerFailed(SANITIZER_NAME.into(), reason));

        if self.allowed_namespaces.is_some() && self.ignored_namespaces.is_some() {
            return fail(
                "allowed_namespaces and ignored_namespaces are mutually exclusive".to_string(),
            );
        }
        if let Err(e) = self.namespace_policy() {
            return fail(e.to_string());
        }
        if !self.cluster_scoped && self.target_namespace.is_empty() {
            return fail("a namespace scoped controller needs a target_namespace".to_string());
        }
        if self.reconcile_interval_secs == 0 {
            return fail("reconcile_interval_secs must be positive".to_string());
        }
        if self.max_concurrent_reconciles == 0 {
            return fail("max_concurrent_reconciles must be positive".to_string());
        }
        Ok(())
    }

    pub fn namespace_policy(&self) -> Result<NamespacePolicy> {
        Ok(NamespacePolicy::new(
            self.allowed_namespaces.as_deref(),
            self.ignored_namespaces.as_deref(),
        )?)
    }

    pub fn scope(&self) -> Result<Scope> {
        Ok(Scope {
            cluster_scoped: self.cluster_scoped,
            target_namespace: self.target_namespace.clone(),
            policy: self.namespace_policy()?,
        })
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}
