//! Background job scheduler.
//!
//! Each registered job gets its own loop that sleeps until the trigger's
//! next fire time, runs the job to completion, then recomputes the next
//! fire time from the completion time. A job never overlaps itself: a
//! manual `run_now` while the job is in flight is dropped.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;
use crate::services::{CancelHandle, CancelToken};

/// Time allowed for in-flight jobs to finish after `stop`.
const STOP_GRACE: Duration = Duration::from_secs(30);

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type JobFn = Arc<dyn Fn(CancelToken) -> JobFuture + Send + Sync>;

/// When a job fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Six-field cron expression (seconds first), evaluated in UTC.
    Cron(Box<cron::Schedule>),
    /// Fixed period, first fire one period after start.
    Interval(Duration),
}

impl Trigger {
    pub fn cron(expr: &str) -> Result<Self, ConfigError> {
        let schedule = cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
            key: "cron".to_string(),
            message: format!("{expr}: {e}"),
        })?;
        Ok(Self::Cron(Box::new(schedule)))
    }

    pub fn every(period: Duration) -> Self {
        Self::Interval(period)
    }

    /// Next fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&after).next(),
            Self::Interval(period) => chrono::Duration::from_std(*period)
                .ok()
                .map(|p| after + p),
        }
    }
}

struct Job {
    id: String,
    trigger: Trigger,
    run: JobFn,
    running: AtomicBool,
}

/// Clears the in-flight flag when the run ends, panics, or is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Job {
    /// Run unless already in flight. Returns whether it ran.
    async fn run_guarded(&self, cancel: CancelToken) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(job = %self.id, "Job still running, trigger dropped");
            return false;
        }
        let _running = RunningGuard(&self.running);
        tracing::info!(job = %self.id, "Scheduled job starting");
        let started = std::time::Instant::now();
        (self.run)(cancel).await;
        tracing::info!(job = %self.id, elapsed_ms = started.elapsed().as_millis() as u64, "Scheduled job done");
        true
    }
}

/// Owns the job loops. Explicitly started and stopped by the process.
pub struct Scheduler {
    jobs: Vec<Arc<Job>>,
    cancel: Option<CancelHandle>,
    token: CancelToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            cancel: None,
            token: CancelToken::never(),
            tasks: Vec::new(),
        }
    }

    /// Register a job. Re-registering an id replaces the earlier job.
    pub fn add_job<F, Fut>(&mut self, id: &str, trigger: Trigger, run: F)
    where
        F: Fn(CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs.retain(|j| j.id != id);
        self.jobs.push(Arc::new(Job {
            id: id.to_string(),
            trigger,
            run: Arc::new(move |cancel| -> JobFuture { Box::pin(run(cancel)) }),
            running: AtomicBool::new(false),
        }));
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.id.as_str()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Run a job immediately. `false` if unknown or already in flight.
    pub async fn run_now(&self, id: &str) -> bool {
        let Some(job) = self.jobs.iter().find(|j| j.id == id) else {
            tracing::warn!(job = id, "Unknown job");
            return false;
        };
        job.run_guarded(self.token.clone()).await
    }

    /// Spawn one loop per job.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("Scheduler already running");
            return;
        }
        let (handle, token) = CancelToken::pair();
        for job in &self.jobs {
            if let Some(next) = job.trigger.next_after(Utc::now()) {
                tracing::info!(job = %job.id, next_run = %next, "Job scheduled");
            }
            self.tasks.push(spawn_job_loop(Arc::clone(job), token.clone()));
        }
        tracing::info!(jobs = self.jobs.len(), "Scheduler started");
        self.cancel = Some(handle);
        self.token = token;
    }

    /// Signal every loop to stop and wait for in-flight jobs, up to a grace
    /// period after which they are aborted.
    pub async fn stop(&mut self) {
        let Some(handle) = self.cancel.take() else {
            return;
        };
        handle.cancel();
        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                tracing::warn!("Job did not finish within grace period, aborting");
                abort.abort();
            }
        }
        self.token = CancelToken::never();
        tracing::info!("Scheduler stopped");
    }
}

fn spawn_job_loop(job: Arc<Job>, cancel: CancelToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = job.trigger.next_after(now) else {
                tracing::warn!(job = %job.id, "Trigger has no future fire time");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            job.run_guarded(cancel.clone()).await;
            if cancel.is_cancelled() {
                return;
            }
        }
    })
}
