use std::sync::OnceLock;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder exactly once, process-wide.
/// Safe to call from multiple places (orchestrator boot, server boot);
/// only the first call wins.
pub fn install_recorder_once() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("install global metrics recorder")
    })
}

/// Renders the current Prometheus exposition text, for the `/metrics` route.
pub fn render() -> String {
    install_recorder_once().render()
}

/// Job-level gauges/counters, named to match the upstream's `aad_aws_sync`
/// namespace exactly (jobs_running, job_is_running{name},
/// job_failed_count{name}, job_success_count{name}).
pub struct JobMetrics;

impl JobMetrics {
    pub fn job_started(name: &str) {
        gauge!("aad_aws_sync_jobs_running").increment(1);
        gauge!("aad_aws_sync_job_is_running", "name" => name.to_string()).set(1.0);
    }

    pub fn job_finished(name: &str, succeeded: bool) {
        gauge!("aad_aws_sync_jobs_running").decrement(1);
        gauge!("aad_aws_sync_job_is_running", "name" => name.to_string()).set(0.0);
        if succeeded {
            counter!("aad_aws_sync_job_success_count", "name" => name.to_string()).increment(1);
        } else {
            counter!("aad_aws_sync_job_failed_count", "name" => name.to_string()).increment(1);
        }
    }
}
