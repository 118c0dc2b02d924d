use thiserror::Error;

use crate::queue::JobState;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Job {id} not found in queue {queue}")]
    NotFound { queue: String, id: String },

    #[error("Job {id} is {state}, expected {expected}")]
    InvalidState {
        id: String,
        state: JobState,
        expected: JobState,
    },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),
}

impl JobError {
    /// Handler failure with a message, the usual way for a processor to
    /// report that a job should be retried.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::ExecutionFailed(message.into())
    }
}

pub type JobResult<T> = Result<T, JobError>;
