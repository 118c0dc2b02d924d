use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::JobError;

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Delay before a failed job is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `delay_ms * 2^(attempts_made - 1)`.
    Exponential { delay_ms: u64 },
}

impl Backoff {
    /// Delay after the `attempts_made`-th failure (1-based).
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { delay_ms } => {
                let exp = attempts_made.saturating_sub(1).min(32);
                Duration::from_millis(delay_ms.saturating_mul(1u64 << exp))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential { delay_ms: 2000 }
    }
}

/// Per-queue defaults merged under every job's own options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultJobOptions {
    pub attempts: u32,
    pub backoff: Backoff,
    pub priority: i32,
    /// Completed jobs retained, oldest pruned first.
    pub keep_completed: usize,
    /// Failed jobs retained, oldest pruned first.
    pub keep_failed: usize,
}

impl Default for DefaultJobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::default(),
            priority: 0,
            keep_completed: 100,
            keep_failed: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub default_job_options: DefaultJobOptions,
    /// A handler running longer than this is stalled. `0` disables detection.
    pub stalled_interval_ms: u64,
    /// Stalls tolerated before the job is failed.
    pub max_stalled_count: u32,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_job_options: DefaultJobOptions::default(),
            stalled_interval_ms: 30_000,
            max_stalled_count: 1,
        }
    }

    pub fn with_default_job_options(mut self, options: DefaultJobOptions) -> Self {
        self.default_job_options = options;
        self
    }

    pub fn with_stalled_interval(mut self, stalled_interval_ms: u64, max_stalled_count: u32) -> Self {
        self.stalled_interval_ms = stalled_interval_ms;
        self.max_stalled_count = max_stalled_count;
        self
    }
}

/// Per-job options; unset fields fall back to the queue defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Caller-chosen id. Submitting an id that already exists returns the
    /// existing job.
    pub job_id: Option<String>,
    pub priority: Option<i32>,
    pub delay_ms: Option<u64>,
    pub attempts: Option<u32>,
    pub backoff: Option<Backoff>,
}

impl JobOptions {
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// One item of a bulk submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkJob {
    pub job_type: String,
    pub payload: Value,
    #[serde(default)]
    pub options: JobOptions,
}

impl BulkJob {
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            options: JobOptions::default(),
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }
}

/// Snapshot of a job. Handlers receive one of these per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub job_type: String,
    pub payload: Value,
    /// Higher runs sooner.
    pub priority: i32,
    pub delay_ms: u64,
    pub attempts_made: u32,
    pub attempts_max: u32,
    pub backoff: Backoff,
    pub state: JobState,
    pub stalled_count: u32,
    pub created_at: Timestamp,
    pub processed_on: Option<Timestamp>,
    pub finished_on: Option<Timestamp>,
    pub failed_reason: Option<String>,
    pub return_value: Option<Value>,
    /// Set on jobs produced by a recurring schedule.
    pub repeat_key: Option<String>,
}

/// Processes jobs of one type.
///
/// Returning an error marks the attempt as failed; the queue then applies
/// its backoff policy. Any `Fn(Job) -> impl Future<Output = Result<Value,
/// JobError>>` closure is a handler.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> Result<Value, JobError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    async fn handle(&self, job: Job) -> Result<Value, JobError> {
        (self)(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays() {
        let fixed = Backoff::Fixed { delay_ms: 500 };
        assert_eq!(fixed.delay_for(1), Duration::from_millis(500));
        assert_eq!(fixed.delay_for(4), Duration::from_millis(500));

        let exp = Backoff::Exponential { delay_ms: 2000 };
        assert_eq!(exp.delay_for(1), Duration::from_millis(2000));
        assert_eq!(exp.delay_for(2), Duration::from_millis(4000));
        assert_eq!(exp.delay_for(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_backoff_saturates() {
        let exp = Backoff::Exponential { delay_ms: u64::MAX / 2 };
        assert_eq!(exp.delay_for(10), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_backoff_serde_shape() {
        let json = serde_json::to_value(Backoff::Fixed { delay_ms: 100 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "fixed", "delay_ms": 100}));

        let parsed: Backoff =
            serde_json::from_str(r#"{"type":"exponential","delay_ms":2000}"#).unwrap();
        assert_eq!(parsed, Backoff::Exponential { delay_ms: 2000 });
    }

    #[test]
    fn test_job_options_builder() {
        let opts = JobOptions::default()
            .with_job_id("welcome-1")
            .with_priority(5)
            .with_delay_ms(100)
            .with_attempts(2)
            .with_backoff(Backoff::Fixed { delay_ms: 10 });
        assert_eq!(opts.job_id.as_deref(), Some("welcome-1"));
        assert_eq!(opts.priority, Some(5));
        assert_eq!(opts.attempts, Some(2));
    }
}
