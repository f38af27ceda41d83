//! Job cleanup reconciler
//!
//! Decides, for one Job identity, whether the Job is ours, whether it has
//! finished, and whether to delete it. Every evaluation re-reads the Job from
//! the store, so redelivered or reordered triggers converge on the same
//! result.

use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::config::{OperatorConfig, DEFAULT_MARKER_LABEL, DEFAULT_REQUEUE_AFTER_SECS};
use crate::error::Result;
use crate::metrics;
use crate::store::{JobKey, JobStore};

/// What the reconciler needs to know to make a decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Label key whose presence marks a Job as ours
    pub marker_label: String,
    /// Delay before the next evaluation of a Job still in scope
    pub requeue_after: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            marker_label: DEFAULT_MARKER_LABEL.to_string(),
            requeue_after: Duration::from_secs(DEFAULT_REQUEUE_AFTER_SECS),
        }
    }
}

impl From<&OperatorConfig> for CleanupPolicy {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            marker_label: config.marker_label.clone(),
            requeue_after: config.requeue_after(),
        }
    }
}

/// Classification of a fetched Job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    /// Marker label absent
    OutOfScope,
    /// Ours, no completion recorded yet
    Pending,
    /// Ours, at least one success or failure recorded
    Terminal(TerminalReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalReason {
    Succeeded,
    Failed,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Succeeded => "succeeded",
            TerminalReason::Failed => "failed",
        }
    }
}

/// Result of a single evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing more to do until the Job changes
    Done,
    /// Evaluate the same Job again after the given delay
    RequeueAfter(Duration),
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// Presence of the key decides, the value is ignored
pub fn has_marker(job: &Job, marker_label: &str) -> bool {
    job.metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(marker_label))
}

/// Terminal reason of a Job, if any; success wins when both counts are set
pub fn terminal_reason(job: &Job) -> Option<TerminalReason> {
    let status = job.status.as_ref()?;
    if status.succeeded.unwrap_or(0) > 0 {
        Some(TerminalReason::Succeeded)
    } else if status.failed.unwrap_or(0) > 0 {
        Some(TerminalReason::Failed)
    } else {
        None
    }
}

pub fn is_terminal(job: &Job) -> bool {
    terminal_reason(job).is_some()
}

pub fn classify(job: &Job, marker_label: &str) -> JobPhase {
    if !has_marker(job, marker_label) {
        return JobPhase::OutOfScope;
    }
    match terminal_reason(job) {
        Some(reason) => JobPhase::Terminal(reason),
        None => JobPhase::Pending,
    }
}

/// Evaluate one Job identity.
///
/// Errors from the store are returned unchanged so the caller's backoff can
/// retry; nothing is retried here.
pub async fn evaluate(
    store: &dyn JobStore,
    key: &JobKey,
    policy: &CleanupPolicy,
) -> Result<Outcome> {
    let Some(job) = store.get(key).await? else {
        debug!(job = %key, "Job no longer exists");
        metrics::EVALUATIONS.with_label_values(&["not_found"]).inc();
        return Ok(Outcome::Done);
    };

    match classify(&job, &policy.marker_label) {
        JobPhase::OutOfScope => {
            info!(job = %key, "Skipping cleanup for non-backup job");
            metrics::EVALUATIONS.with_label_values(&["out_of_scope"]).inc();
            Ok(Outcome::Done)
        }
        JobPhase::Pending => {
            debug!(job = %key, "Job still running");
            metrics::EVALUATIONS.with_label_values(&["pending"]).inc();
            Ok(Outcome::RequeueAfter(policy.requeue_after))
        }
        JobPhase::Terminal(reason) => {
            info!(job = %key, reason = reason.as_str(), "Cleaning up completed/failed job");
            if let Err(e) = store.delete(key, job.metadata.uid.as_deref()).await {
                warn!(job = %key, error = %e, "Failed to delete job");
                return Err(e);
            }
            metrics::EVALUATIONS.with_label_values(&["deleted"]).inc();
            metrics::JOBS_DELETED
                .with_label_values(&[key.namespace.as_str(), reason.as_str()])
                .inc();
            Ok(Outcome::RequeueAfter(policy.requeue_after))
        }
    }
}
