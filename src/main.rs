//! Job Cleanup Operator
//!
//! Main entry point for the operator. Loads configuration, sets up the
//! Kubernetes client, and runs the Job cleanup controller.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use job_cleanup_operator::{
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
    store::KubeJobStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Job Cleanup Operator");

    let config = OperatorConfig::from_env()?;
    info!(
        marker_label = %config.marker_label,
        requeue_after_secs = config.requeue_after_secs,
        propagation_policy = %config.propagation_policy,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let store = Arc::new(KubeJobStore::new(client.clone(), config.delete_params()?));
    let shutdown = CancellationToken::new();
    let context = Arc::new(Context::new(store, &config, shutdown.clone()));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    // SIGINT/SIGTERM cancel the shared token; the controller drains and returns
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, stopping operator");
        signal_token.cancel();
    });

    let cleanup_controller =
        controllers::run_job_cleanup_controller(client, config.clone(), context);

    tokio::select! {
        _ = cleanup_controller => {
            if !shutdown.is_cancelled() {
                error!("Job cleanup controller exited unexpectedly");
            }
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
    }

    shutdown.cancel();
    metrics::OPERATOR_HEALTH.set(0.0);

    info!("Job Cleanup Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber; JSON unless LOG_FORMAT=text
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("text") => registry.with(tracing_subscriber::fmt::layer()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
