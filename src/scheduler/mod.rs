//! Generic background job runner.
//!
//! Holds a set of named jobs, each with a fixed interval. `start` spawns one
//! independent loop per job; job errors are logged and never propagated — the
//! next tick is the retry policy. All loops stop cooperatively at the next
//! tick boundary when the shutdown signal fires.

pub mod jobs;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn add_job(&mut self, job: Arc<dyn Job>) {
        self.jobs.push(job);
    }

    /// Spawns one periodic loop per registered job. The returned handles
    /// complete once `shutdown` is signalled.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                let shutdown = shutdown.clone();
                tokio::spawn(run_job_loop(job, shutdown))
            })
            .collect()
    }
}

async fn run_job_loop(job: Arc<dyn Job>, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(name = job.name(), interval = ?job.interval(), "Starting job");

    // First tick fires one interval from now, not immediately.
    let start = tokio::time::Instant::now() + job.interval();
    let mut ticker = tokio::time::interval_at(start, job.interval());

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!(name = job.name(), "Stopping job");
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = job.run().await {
                    tracing::error!(name = job.name(), "Job failed: {:?}", err);
                }
            }
        }
    }
}
