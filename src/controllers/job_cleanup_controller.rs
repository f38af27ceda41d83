//! Job cleanup controller
//!
//! Watches `batch/v1` Jobs and triggers cleanup reconciliation.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::controllers::Context;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::job_cleanup;
use crate::store::JobKey;

/// Kind label used in metrics
const KIND: &str = "Job";

/// Run the Job cleanup controller
pub async fn run(client: Client, config: OperatorConfig, context: Arc<Context>) {
    let api: Api<Job> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    // Verify we are allowed to list Jobs before starting the watch
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Cannot list Jobs, check RBAC permissions: {}", e);
        return;
    }

    let mut watcher_config = WatcherConfig::default();
    if let Some(selector) = config.label_selector() {
        watcher_config = watcher_config.labels(&selector);
    }

    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        marker_label = %config.marker_label,
        "Starting Job cleanup controller"
    );

    let controller = Controller::new(api, watcher_config);

    // Ready once the reflector holds the initial list of Jobs
    let reader = controller.store();
    tokio::spawn(async move {
        if reader.wait_until_ready().await.is_ok() {
            info!("Initial Job list synced");
            metrics::OPERATOR_READY.set(1.0);
        }
    });

    // Stop taking new work once shutdown starts; in-flight reconciles see
    // the same token and return early
    let shutdown = context.shutdown.clone();

    controller
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Job"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;

    metrics::OPERATOR_READY.set(0.0);
    info!("Job cleanup controller stopped");
}

/// Main reconciliation function.
///
/// The watched object only identifies the Job; the decision is made on a
/// fresh read through the store.
#[instrument(skip(job, ctx), fields(name = %job.name_any(), namespace = job.namespace()))]
async fn reconcile(job: Arc<Job>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let key = JobKey::for_job(&job);

    let outcome = tokio::select! {
        biased;
        _ = ctx.shutdown.cancelled() => return Err(Error::Cancelled),
        result = job_cleanup::evaluate(ctx.store.as_ref(), &key, &ctx.policy) => result?,
    };

    ctx.backoff.reset(&key);
    Ok(outcome.into())
}

/// Error policy for the controller
fn error_policy(job: Arc<Job>, error: &Error, ctx: Arc<Context>) -> Action {
    metrics::RECONCILIATION_ERRORS
        .with_label_values(&[KIND, error.metric_label()])
        .inc();

    if matches!(error, Error::Cancelled) {
        return Action::await_change();
    }

    let key = JobKey::for_job(&job);
    let delay = ctx.backoff.next_delay(&key);
    error!(
        job = %key,
        error = %error,
        retry_in_secs = delay.as_secs(),
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(delay)
}
