//! Kubernetes controllers for the Job Cleanup Operator
//!
//! This module contains the controller that watches Jobs and triggers
//! reconciliation.

mod backoff;
mod job_cleanup_controller;

pub use backoff::RetryBackoff;
pub use job_cleanup_controller::run as run_job_cleanup_controller;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::reconcilers::job_cleanup::CleanupPolicy;
use crate::store::JobStore;

/// Shared context for the controller
pub struct Context {
    /// Read/delete access to Jobs
    pub store: Arc<dyn JobStore>,
    pub policy: CleanupPolicy,
    pub backoff: RetryBackoff,
    /// Cancelled when the operator shuts down
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a new context
    pub fn new(
        store: Arc<dyn JobStore>,
        config: &OperatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            policy: CleanupPolicy::from(config),
            backoff: RetryBackoff::new(config.retry_base(), config.retry_max()),
            shutdown,
        }
    }
}
