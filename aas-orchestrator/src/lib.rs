use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aas_common::metrics::JobMetrics;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Handler = Arc<dyn Fn(CancellationToken) -> HandlerFuture + Send + Sync>;

/// Mutex-guarded single-flight gate: only one invocation of a given job
/// name may be in progress at any instant.
struct JobStatus(Mutex<bool>);

impl JobStatus {
    fn new() -> Self {
        Self(Mutex::new(false))
    }

    async fn in_progress(&self) -> bool {
        *self.0.lock().await
    }

    async fn set(&self, value: bool) {
        *self.0.lock().await = value;
    }
}

struct Job {
    name: &'static str,
    status: Arc<JobStatus>,
    schedule_enabled: bool,
    handler: Handler,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Created,
    Conflict,
    NotFound,
}

/// Named, single-flight, cancellable job runner.
///
/// Mirrors the upstream orchestrator's `Job`/`SyncStatus` pair: jobs are
/// registered once at construction, then either ticked on a schedule or
/// triggered manually through `trigger`. Both paths fall through the same
/// `run` single-flight gate, so a scheduled tick and a manual trigger
/// racing each other behave exactly like two overlapping scheduled ticks.
pub struct Orchestrator {
    jobs: HashMap<&'static str, Job>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Orchestrator {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            jobs: HashMap::new(),
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// Registers a job. `handler` receives this orchestrator's shared
    /// cancellation token and must observe it at loop boundaries.
    pub fn register<F, Fut>(&mut self, name: &'static str, schedule_enabled: bool, handler: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.jobs.insert(
            name,
            Job {
                name,
                status: Arc::new(JobStatus::new()),
                schedule_enabled,
                handler: Arc::new(move |cancel| Box::pin(handler(cancel))),
            },
        );
    }

    /// Single-flight run: if the job is already in progress, logs a
    /// warning and returns immediately without spawning anything.
    pub async fn run(&self, name: &str) {
        let Some(job) = self.jobs.get(name) else {
            warn!(job_name = name, "run requested for unknown job");
            return;
        };

        if job.status.in_progress().await {
            warn!(job_name = name, "job already in progress, skipping this invocation");
            return;
        }

        job.status.set(true).await;
        JobMetrics::job_started(job.name);

        let status = job.status.clone();
        let handler = job.handler.clone();
        let cancel = self.cancel.clone();
        let job_name = job.name;

        self.tracker.spawn(async move {
            let result = handler(cancel).await;
            match &result {
                Ok(()) => info!(job_name, "job completed successfully"),
                Err(e) => error!(job_name, error = %e, "job failed"),
            }
            JobMetrics::job_finished(job_name, result.is_ok());
            status.set(false).await;
        });
    }

    /// Used by the admin HTTP surface: returns `NotFound`/`Conflict`/`Created`
    /// without blocking on the job itself.
    pub async fn trigger(&self, name: &str) -> TriggerOutcome {
        let Some(job) = self.jobs.get(name) else {
            return TriggerOutcome::NotFound;
        };
        if job.status.in_progress().await {
            return TriggerOutcome::Conflict;
        }
        self.run(name).await;
        TriggerOutcome::Created
    }

    /// Starts one ticker per schedule-enabled job at `frequency`. Ticks
    /// stop firing once `cancel` fires.
    pub fn start_scheduler(self: &Arc<Self>, frequency: std::time::Duration) {
        for name in self.jobs.values().filter(|j| j.schedule_enabled).map(|j| j.name) {
            let orchestrator = self.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(frequency);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            orchestrator.run(name).await;
                        }
                    }
                }
            });
        }
    }

    /// Waits for every currently-spawned job task to finish. Call after
    /// cancelling, during shutdown.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn single_flight_drops_overlapping_invocation() {
        let cancel = CancellationToken::new();
        let mut orchestrator = Orchestrator::new(cancel.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        orchestrator.register("slow", false, move |_cancel| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(())
            }
        });

        let orchestrator = Arc::new(orchestrator);
        orchestrator.run("slow").await;
        orchestrator.run("slow").await; // should be dropped, job still in progress
        orchestrator.drain().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_reports_not_found_for_unknown_job() {
        let orchestrator = Orchestrator::new(CancellationToken::new());
        let outcome = orchestrator.trigger("nope").await;
        assert_eq!(outcome, TriggerOutcome::NotFound);
    }
}
