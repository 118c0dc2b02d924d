//! Job lifecycle events, published on a broadcast channel.

use serde::Serialize;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum JobEvent {
    Added {
        queue: String,
        job_id: String,
        job_type: String,
    },
    Active {
        queue: String,
        job_id: String,
        attempt: u32,
    },
    Completed {
        queue: String,
        job_id: String,
        elapsed_ms: u64,
    },
    /// An attempt failed and the job was re-queued.
    Retrying {
        queue: String,
        job_id: String,
        attempts_made: u32,
        delay_ms: u64,
    },
    /// Final failure; the job will not run again unless retried by hand.
    Failed {
        queue: String,
        job_id: String,
        attempts_made: u32,
        reason: String,
    },
    Stalled {
        queue: String,
        job_id: String,
        stalled_count: u32,
    },
}

impl JobEvent {
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::Added { queue, .. }
            | JobEvent::Active { queue, .. }
            | JobEvent::Completed { queue, .. }
            | JobEvent::Retrying { queue, .. }
            | JobEvent::Failed { queue, .. }
            | JobEvent::Stalled { queue, .. } => queue,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Added { job_id, .. }
            | JobEvent::Active { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Retrying { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Stalled { job_id, .. } => job_id,
        }
    }

    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}
