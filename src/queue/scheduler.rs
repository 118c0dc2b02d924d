use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::queue::{JobError, JobOptions, Queue};

/// A cron schedule that submits a job on every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringJob {
    /// Identity of the schedule: queue, type, cron and payload.
    pub key: String,
    pub queue: String,
    pub job_type: String,
    pub cron: String,
    pub payload: Value,
    pub schedule_id: Uuid,
}

/// Wrapper around tokio-cron-scheduler. The scheduler is started on first
/// use; registering an identical schedule twice returns the first one.
pub(crate) struct RecurringScheduler {
    scheduler: Mutex<Option<JobScheduler>>,
    schedules: DashMap<String, RecurringJob>,
}

pub(crate) fn repeat_key(queue: &str, job_type: &str, cron: &str, payload: &Value) -> String {
    format!("{}:{}:{}:{}", queue, job_type, cron, payload)
}

impl RecurringScheduler {
    pub(crate) fn new() -> Self {
        Self {
            scheduler: Mutex::new(None),
            schedules: DashMap::new(),
        }
    }

    pub(crate) async fn add(
        &self,
        queue: Arc<Queue>,
        job_type: &str,
        payload: Value,
        cron: &str,
        options: JobOptions,
    ) -> Result<RecurringJob, JobError> {
        let key = repeat_key(queue.name(), job_type, cron, &payload);

        // held for the whole registration so identical concurrent calls
        // cannot both schedule
        let mut guard = self.scheduler.lock().await;
        if let Some(existing) = self.schedules.get(&key) {
            debug!(repeat_key = %key, "Recurring job already scheduled");
            return Ok(existing.clone());
        }

        if guard.is_none() {
            let scheduler = JobScheduler::new()
                .await
                .map_err(|e| JobError::Scheduler(e.to_string()))?;
            scheduler
                .start()
                .await
                .map_err(|e| JobError::Scheduler(e.to_string()))?;
            *guard = Some(scheduler);
        }
        let Some(scheduler) = guard.as_ref() else {
            return Err(JobError::Scheduler("scheduler not running".to_string()));
        };

        let tick_queue = queue.clone();
        let tick_type = job_type.to_string();
        let tick_payload = payload.clone();
        let tick_key = key.clone();
        let cron_job = CronJob::new_async(cron, move |_uuid, _lock| {
            let queue = tick_queue.clone();
            let job_type = tick_type.clone();
            let payload = tick_payload.clone();
            let options = options.clone();
            let repeat_key = tick_key.clone();

            Box::pin(async move {
                match queue.add_repeat(&job_type, payload, options, &repeat_key) {
                    Ok(job) => {
                        debug!(queue = %queue.name(), job_id = %job.id, repeat_key = %repeat_key, "Recurring job enqueued")
                    }
                    Err(e) => {
                        error!(queue = %queue.name(), repeat_key = %repeat_key, error = %e, "Failed to enqueue recurring job")
                    }
                }
            })
        })
        .map_err(|e| JobError::InvalidCronExpression(format!("{}: {}", cron, e)))?;

        let schedule_id = scheduler
            .add(cron_job)
            .await
            .map_err(|e| JobError::Scheduler(e.to_string()))?;

        let recurring = RecurringJob {
            key: key.clone(),
            queue: queue.name().to_string(),
            job_type: job_type.to_string(),
            cron: cron.to_string(),
            payload,
            schedule_id,
        };
        self.schedules.insert(key, recurring.clone());

        info!(queue = %recurring.queue, job_type = %recurring.job_type, cron = %recurring.cron, "Recurring job scheduled");
        Ok(recurring)
    }

    /// Stop a schedule. Returns whether it existed.
    pub(crate) async fn remove(&self, key: &str) -> Result<bool, JobError> {
        let guard = self.scheduler.lock().await;
        let Some((_, recurring)) = self.schedules.remove(key) else {
            return Ok(false);
        };

        if let Some(scheduler) = guard.as_ref() {
            scheduler
                .remove(&recurring.schedule_id)
                .await
                .map_err(|e| JobError::Scheduler(e.to_string()))?;
        }
        info!(repeat_key = %key, "Recurring job removed");
        Ok(true)
    }

    pub(crate) fn list(&self) -> Vec<RecurringJob> {
        let mut jobs: Vec<RecurringJob> = self.schedules.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        jobs
    }

    pub(crate) async fn shutdown(&self) {
        let mut guard = self.scheduler.lock().await;
        if let Some(mut scheduler) = guard.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "Scheduler shutdown failed");
            }
        }
        self.schedules.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::broadcast;

    use super::*;
    use crate::queue::QueueConfig;

    fn queue() -> Arc<Queue> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(Queue::new(QueueConfig::new("reports"), tx))
    }

    #[test]
    fn test_repeat_key() {
        assert_eq!(
            repeat_key("reports", "daily", "0 0 * * * *", &json!({"a": 1})),
            r#"reports:daily:0 0 * * * *:{"a":1}"#
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identical_registration_yields_one_schedule() {
        let scheduler = RecurringScheduler::new();
        let q = queue();

        let first = scheduler
            .add(q.clone(), "daily", json!({"a": 1}), "0 */5 * * * *", JobOptions::default())
            .await
            .unwrap();
        let second = scheduler
            .add(q.clone(), "daily", json!({"a": 1}), "0 */5 * * * *", JobOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(scheduler.list().len(), 1);

        // a different payload is a different schedule
        scheduler
            .add(q.clone(), "daily", json!({"a": 2}), "0 */5 * * * *", JobOptions::default())
            .await
            .unwrap();
        assert_eq!(scheduler.list().len(), 2);

        assert!(scheduler.remove(&first.key).await.unwrap());
        assert!(!scheduler.remove(&first.key).await.unwrap());
        assert_eq!(scheduler.list().len(), 1);

        scheduler.shutdown().await;
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_cron_rejected() {
        let scheduler = RecurringScheduler::new();
        let err = scheduler
            .add(queue(), "daily", json!({}), "not a cron", JobOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidCronExpression(_)));
        assert!(scheduler.list().is_empty());
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_schedule_enqueues_jobs() {
        let scheduler = RecurringScheduler::new();
        let q = queue();
        let recurring = scheduler
            .add(q.clone(), "tick", json!({}), "* * * * * *", JobOptions::default().with_job_id("fixed"))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while q.stats().waiting < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        scheduler.shutdown().await;

        // every tick is a new job even though a job id was supplied
        assert!(q.stats().waiting >= 2);
        assert!(q.get("fixed").is_none());
        assert_eq!(recurring.cron, "* * * * * *");
    }
}
