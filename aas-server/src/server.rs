use std::sync::Arc;

use aas_common::response;
use aas_orchestrator::TriggerOutcome;
use axum::Router;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use owo_colors::OwoColorize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::app::App;

/// Runs the admin HTTP surface: job triggers plus health/metrics. Binds
/// and serves until `cancel` fires, then returns once the listener has
/// drained in-flight requests.
pub async fn run(cancel: CancellationToken, addr: String, app: Arc<App>) -> anyhow::Result<()> {
    let health_router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));

    let router = Router::new()
        .route("/azure2aws", axum::routing::post(run_azure2aws))
        .route("/awsmapping", axum::routing::post(run_awsmapping))
        .route("/aws2k8s", axum::routing::post(run_aws2k8s))
        .route("/capsvc2azure", axum::routing::post(run_capsvc2azure))
        .with_state(app);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            eprintln!("{}", format!("failed to bind admin server to {addr}: {e}").red());
            e
        })?;

    println!("{}", format!("starting admin server • addr={addr}").green());
    axum::serve(listener, router.merge(health_router))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    println!("{}", "admin server stopped".red());
    Ok(())
}

/// Runs the `/metrics` Prometheus exposition endpoint on its own port, kept
/// separate from the admin surface so scraping never competes with an
/// operator triggering a job.
pub async fn run_metrics(cancel: CancellationToken, addr: String) -> anyhow::Result<()> {
    let router = Router::new().route("/metrics", get(|| async { aas_common::metrics::render() }));

    let listener = TcpListener::bind(&addr).await?;
    println!("{}", format!("starting metrics server • addr={addr}").green());
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    println!("{}", "metrics server stopped".red());
    Ok(())
}

async fn trigger(app: &App, name: &str) -> Response {
    match app.orchestrator.trigger(name).await {
        TriggerOutcome::Created => response::created("job created"),
        TriggerOutcome::Conflict => response::conflict(anyhow::anyhow!("job in progress")),
        TriggerOutcome::NotFound => response::not_found(anyhow::anyhow!("job not found")),
    }
}

async fn run_azure2aws(State(app): State<Arc<App>>) -> Response {
    trigger(&app, aas_reconcile::directory_to_cloudapp::JOB_NAME).await
}

async fn run_awsmapping(State(app): State<Arc<App>>) -> Response {
    trigger(&app, aas_reconcile::cloudgroups_to_cloudaccounts::JOB_NAME).await
}

async fn run_aws2k8s(State(app): State<Arc<App>>) -> Response {
    trigger(&app, aas_reconcile::cloud_to_cluster::JOB_NAME).await
}

async fn run_capsvc2azure(State(app): State<Arc<App>>) -> Response {
    trigger(&app, aas_reconcile::capsvc_to_directory::JOB_NAME).await
}
