//! Named queues, their processors and recurring schedules.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::QueueSettings;
use crate::queue::events::EVENT_CHANNEL_CAPACITY;
use crate::queue::scheduler::RecurringScheduler;
use crate::queue::worker::Worker;
use crate::queue::{
    BulkJob, CleanReport, Job, JobError, JobEvent, JobHandler, JobOptions, Queue, QueueConfig,
    QueueStats, RecurringJob,
};

/// Owns every queue. Queue names are fixed at construction.
pub struct QueueRegistry {
    queues: HashMap<String, Arc<Queue>>,
    events: broadcast::Sender<JobEvent>,
    scheduler: RecurringScheduler,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl QueueRegistry {
    pub fn new(configs: impl IntoIterator<Item = QueueConfig>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut queues = HashMap::new();
        for config in configs {
            if queues.contains_key(&config.name) {
                warn!(queue = %config.name, "Duplicate queue configuration ignored");
                continue;
            }
            info!(
                queue = %config.name,
                attempts = config.default_job_options.attempts,
                backoff = ?config.default_job_options.backoff,
                "Queue registered"
            );
            let name = config.name.clone();
            queues.insert(name, Arc::new(Queue::new(config, events.clone())));
        }

        Self {
            queues,
            events,
            scheduler: RecurringScheduler::new(),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_settings(settings: &[QueueSettings]) -> Self {
        Self::new(settings.iter().map(QueueSettings::to_queue_config))
    }

    pub fn queue(&self, name: &str) -> Result<&Arc<Queue>, JobError> {
        self.queues
            .get(name)
            .ok_or_else(|| JobError::QueueNotFound(name.to_string()))
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Receive every job event from every queue.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Submit a job and return its snapshot right away.
    pub async fn add_job(
        &self,
        queue: &str,
        job_type: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<Job, JobError> {
        self.queue(queue)?.add(job_type, payload, options)
    }

    /// Submit several jobs at once. An unknown queue fails the whole call;
    /// otherwise every item gets its own result.
    pub async fn add_bulk_jobs(
        &self,
        queue: &str,
        jobs: Vec<BulkJob>,
    ) -> Result<Vec<Result<Job, JobError>>, JobError> {
        Ok(self.queue(queue)?.add_bulk(jobs))
    }

    /// Submit `job_type` on every tick of `cron`. An identical
    /// `(queue, job_type, cron, payload)` registration returns the existing
    /// schedule.
    pub async fn add_recurring_job(
        &self,
        queue: &str,
        job_type: &str,
        payload: Value,
        cron: &str,
        options: JobOptions,
    ) -> Result<RecurringJob, JobError> {
        let queue = self.queue(queue)?.clone();
        self.scheduler
            .add(queue, job_type, payload, cron, options)
            .await
    }

    pub async fn remove_recurring_job(&self, key: &str) -> Result<bool, JobError> {
        self.scheduler.remove(key).await
    }

    pub fn recurring_jobs(&self) -> Vec<RecurringJob> {
        self.scheduler.list()
    }

    /// Start a worker running `handler` for jobs of `job_type`, at most
    /// `concurrency` at a time.
    pub fn register_processor<H>(
        &self,
        queue: &str,
        job_type: &str,
        handler: H,
        concurrency: usize,
    ) -> Result<(), JobError>
    where
        H: JobHandler + 'static,
    {
        let queue = self.queue(queue)?.clone();
        let concurrency = concurrency.max(1);
        info!(queue = %queue.name(), job_type, concurrency, "Processor registered");

        let worker = Worker {
            queue,
            job_type: job_type.to_string(),
            handler: Arc::new(handler),
            permits: Arc::new(Semaphore::new(concurrency)),
            tracker: self.tracker.clone(),
            cancel: self.cancel.child_token(),
        };
        self.tracker.spawn(worker.run());
        Ok(())
    }

    pub async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats, JobError> {
        Ok(self.queue(queue)?.stats())
    }

    pub async fn get_all_queue_stats(&self) -> BTreeMap<String, QueueStats> {
        self.queues
            .iter()
            .map(|(name, queue)| (name.clone(), queue.stats()))
            .collect()
    }

    pub async fn get_job(&self, queue: &str, id: &str) -> Result<Job, JobError> {
        self.queue(queue)?.get(id).ok_or_else(|| JobError::NotFound {
            queue: queue.to_string(),
            id: id.to_string(),
        })
    }

    pub async fn pause_queue(&self, queue: &str) -> Result<(), JobError> {
        self.queue(queue)?.pause();
        info!(queue, "Queue paused");
        Ok(())
    }

    pub async fn resume_queue(&self, queue: &str) -> Result<(), JobError> {
        self.queue(queue)?.resume();
        info!(queue, "Queue resumed");
        Ok(())
    }

    /// Drop completed and failed jobs older than `grace_ms`.
    pub async fn clean_queue(&self, queue: &str, grace_ms: u64) -> Result<CleanReport, JobError> {
        let report = self.queue(queue)?.clean(Duration::from_millis(grace_ms));
        info!(
            queue,
            grace_ms,
            completed = report.completed,
            failed = report.failed,
            "Queue cleaned"
        );
        Ok(report)
    }

    /// Re-run a failed job from scratch.
    pub async fn retry_job(&self, queue: &str, id: &str) -> Result<Job, JobError> {
        let job = self.queue(queue)?.retry(id)?;
        info!(queue, job_id = id, "Job re-queued by hand");
        Ok(job)
    }

    /// Stop workers, wait for in-flight jobs and shut the scheduler down.
    pub async fn close(&self) {
        self.scheduler.shutdown().await;
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Queue registry closed");
    }
}
