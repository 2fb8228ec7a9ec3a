// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kafka_operator::{
    constants::{DEFAULT_METRICS_ADDR, KIND_KAFKA_CLUSTER, TOKIO_WORKER_THREADS},
    context::{requeue_after_error, requeue_after_success, Context},
    crd::{KafkaCluster, Listener},
    errors::ReconcileError,
    metrics,
    reconcilers::reconcile_kafkacluster,
    store::KubeStore,
};
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kubernetes operator for Apache Kafka clusters
#[derive(Parser, Debug)]
#[command(name = "kafka-operator", version, about, long_about = None)]
struct Args {
    /// Only watch `KafkaCluster` objects in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Address the `/metrics` endpoint listens on
    #[arg(long, env = "KAFKA_OPERATOR_METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("kafka-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

/// Initialize logging.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level.
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing(args.log_format);

    info!("Starting Kafka operator");
    debug!(?args, "Parsed arguments");

    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let ctx = Arc::new(Context::new(
        Arc::new(KubeStore::new(client.clone())),
        shutdown.clone(),
    ));

    // The controller should never exit on its own; the metrics server only on shutdown
    tokio::select! {
        result = run_kafkacluster_controller(client, args.namespace, ctx) => {
            if !shutdown.is_cancelled() {
                error!("CRITICAL: KafkaCluster controller exited unexpectedly: {:?}", result);
            }
            result
        }
        result = serve_metrics(args.metrics_addr, shutdown.clone()) => {
            error!("Metrics server exited: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot install SIGTERM handler, only SIGINT is handled");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received SIGINT");
    }

    info!("Shutting down, cancelling in-flight reconciliations");
    shutdown.cancel();
}

/// Serve Prometheus metrics until shutdown.
async fn serve_metrics(addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    metrics::gather_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Run the `KafkaCluster` controller
async fn run_kafkacluster_controller(
    client: Client,
    namespace: Option<String>,
    ctx: Arc<Context>,
) -> Result<()> {
    info!(namespace = ?namespace, "Starting KafkaCluster controller");

    let clusters = match namespace.as_deref() {
        Some(ns) => Api::<KafkaCluster>::namespaced(client.clone(), ns),
        None => Api::<KafkaCluster>::all(client.clone()),
    };

    Controller::new(clusters, Config::default())
        .owns(Api::<StatefulSet>::all(client.clone()), Config::default())
        .owns(Api::<ConfigMap>::all(client.clone()), Config::default())
        .owns(Api::<Service>::all(client.clone()), Config::default())
        .owns(Api::<Listener>::all(client.clone()), Config::default())
        .owns(Api::<PodDisruptionBudget>::all(client), Config::default())
        .shutdown_on_signal()
        .run(reconcile_kafkacluster_wrapper, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => debug!(?action, "KafkaCluster reconciliation completed"),
                Err(e) => debug!(error = ?e, "KafkaCluster reconciliation error"),
            }
        })
        .await;

    Ok(())
}

/// Reconcile wrapper for `KafkaCluster`
async fn reconcile_kafkacluster_wrapper(
    cluster: Arc<KafkaCluster>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        cluster_name = %cluster.name_any(),
        namespace = ?cluster.namespace(),
        "Reconcile wrapper called for KafkaCluster"
    );
    if let Some(action) = ctx.shutdown_action() {
        debug!(cluster_name = %cluster.name_any(), "Operator shutting down, skipping pass");
        return Ok(action);
    }
    let start = Instant::now();

    match reconcile_kafkacluster(Arc::clone(&ctx.store), Arc::clone(&cluster), ctx.pass_token())
        .await
    {
        Ok(requeue) => {
            if requeue.is_some() {
                metrics::record_reconciliation_requeue(KIND_KAFKA_CLUSTER, "not_converged");
            } else {
                metrics::record_reconciliation_success(KIND_KAFKA_CLUSTER, start.elapsed());
                info!("Successfully reconciled KafkaCluster: {}", cluster.name_any());
            }
            Ok(Action::requeue(requeue_after_success(requeue)))
        }
        Err(e) => {
            error!("Failed to reconcile KafkaCluster {}: {}", cluster.name_any(), e);
            metrics::record_reconciliation_error(KIND_KAFKA_CLUSTER, start.elapsed());
            metrics::record_error(KIND_KAFKA_CLUSTER, e.metric_label());
            Err(e)
        }
    }
}

/// Error policy for the `KafkaCluster` controller
fn error_policy(cluster: Arc<KafkaCluster>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    let delay = requeue_after_error(err);
    warn!(
        cluster_name = %cluster.name_any(),
        error_type = err.metric_label(),
        delay_secs = delay.as_secs(),
        "Requeueing KafkaCluster after error"
    );
    metrics::record_reconciliation_requeue(KIND_KAFKA_CLUSTER, "error");
    Action::requeue(delay)
}
