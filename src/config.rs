//! Operator configuration
//!
//! Settings are read from `JOB_CLEANUP_*` environment variables. Every field
//! has a default, so an empty environment yields a working configuration.

use std::time::Duration;

use kube::api::{DeleteParams, PropagationPolicy};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "JOB_CLEANUP_";

/// Label key that marks a Job as owned by the backup workflow
pub const DEFAULT_MARKER_LABEL: &str = "backup-database";

/// Delay between self-scheduled evaluations of the same Job
pub const DEFAULT_REQUEUE_AFTER_SECS: u64 = 60;

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_marker_label")]
    pub marker_label: String,

    #[serde(default = "default_requeue_after_secs")]
    pub requeue_after_secs: u64,

    /// Watch a single namespace instead of the whole cluster
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Narrow the watch with an existence selector on the marker label
    #[serde(default = "default_true")]
    pub filter_by_marker: bool,

    /// Background, Foreground or Orphan
    #[serde(default = "default_propagation_policy")]
    pub propagation_policy: String,

    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_marker_label() -> String {
    DEFAULT_MARKER_LABEL.to_string()
}

fn default_requeue_after_secs() -> u64 {
    DEFAULT_REQUEUE_AFTER_SECS
}

fn default_true() -> bool {
    true
}

fn default_propagation_policy() -> String {
    "Background".to_string()
}

fn default_retry_base_secs() -> u64 {
    5
}

fn default_retry_max_secs() -> u64 {
    300
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            marker_label: default_marker_label(),
            requeue_after_secs: default_requeue_after_secs(),
            watch_namespace: None,
            filter_by_marker: true,
            propagation_policy: default_propagation_policy(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl OperatorConfig {
    /// Load and validate configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from explicit key/value pairs
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_label_key(&self.marker_label)?;

        if self.requeue_after_secs == 0 {
            return Err(Error::config("requeue_after_secs must be greater than zero"));
        }

        if self.retry_base_secs == 0 || self.retry_base_secs > self.retry_max_secs {
            return Err(Error::config(format!(
                "retry_base_secs ({}) must be between 1 and retry_max_secs ({})",
                self.retry_base_secs, self.retry_max_secs
            )));
        }

        if let Some(ns) = &self.watch_namespace {
            if ns.trim().is_empty() {
                return Err(Error::config("watch_namespace must not be blank"));
            }
        }

        self.propagation()?;
        Ok(())
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs)
    }

    pub fn propagation(&self) -> Result<PropagationPolicy> {
        match self.propagation_policy.as_str() {
            "Background" => Ok(PropagationPolicy::Background),
            "Foreground" => Ok(PropagationPolicy::Foreground),
            "Orphan" => Ok(PropagationPolicy::Orphan),
            other => Err(Error::config(format!(
                "Invalid propagation policy '{}': must be one of: Background, Foreground, Orphan",
                other
            ))),
        }
    }

    /// Delete parameters applied to every Job deletion
    pub fn delete_params(&self) -> Result<DeleteParams> {
        Ok(DeleteParams {
            propagation_policy: Some(self.propagation()?),
            ..DeleteParams::default()
        })
    }

    /// Label selector used to narrow the watch, if enabled
    pub fn label_selector(&self) -> Option<String> {
        self.filter_by_marker.then(|| self.marker_label.clone())
    }
}

/// Validate a Kubernetes label key: `[prefix/]name`
fn validate_label_key(key: &str) -> Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        let valid_prefix = !prefix.is_empty()
            && prefix.len() <= 253
            && prefix.split('.').all(|part| {
                !part.is_empty()
                    && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                    && !part.starts_with('-')
                    && !part.ends_with('-')
            });
        if !valid_prefix {
            return Err(Error::config(format!("Invalid label key prefix in '{}'", key)));
        }
    }

    let valid_name = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !valid_name {
        return Err(Error::config(format!("Invalid label key '{}'", key)));
    }

    Ok(())
}
