//! In-process job queues.
//!
//! Jobs are submitted to named queues and processed by handlers registered
//! per job type. Failed attempts are retried with fixed or exponential
//! backoff, handlers that exceed the stall interval are re-queued, and cron
//! schedules submit jobs on every tick.
//!
//! ```ignore
//! let registry = QueueRegistry::new([QueueConfig::new("email")]);
//! registry.register_processor("email", "welcome", |job: Job| async move {
//!     send_welcome(&job.payload).await?;
//!     Ok(serde_json::json!({"sent": true}))
//! }, 4)?;
//! registry.add_job("email", "welcome", json!({"to": "ana"}), JobOptions::default()).await?;
//! ```

mod error;
mod events;
#[allow(clippy::module_inception)]
mod queue;
mod registry;
mod scheduler;
mod types;
mod worker;

pub use error::{JobError, JobResult};
pub use events::{EVENT_CHANNEL_CAPACITY, JobEvent};
pub use queue::{CleanReport, Queue, QueueStats};
pub use registry::QueueRegistry;
pub use scheduler::RecurringJob;
pub use types::{
    Backoff, BulkJob, DefaultJobOptions, Job, JobHandler, JobOptions, JobState, QueueConfig,
};
