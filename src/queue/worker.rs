//! Worker loop for one registered processor.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::queue::queue::{Claim, FailOutcome, StallOutcome};
use crate::queue::{Job, JobError, JobHandler, Queue};

pub(crate) struct Worker {
    pub(crate) queue: Arc<Queue>,
    pub(crate) job_type: String,
    pub(crate) handler: Arc<dyn JobHandler>,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) tracker: TaskTracker,
    pub(crate) cancel: CancellationToken,
}

impl Worker {
    /// Claim and dispatch jobs until cancelled. Each job runs on the tracker
    /// holding one concurrency permit.
    pub(crate) async fn run(self) {
        debug!(queue = %self.queue.name(), job_type = %self.job_type, "Worker started");

        loop {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(job) = self.next_job().await else {
                break;
            };

            let queue = self.queue.clone();
            let handler = self.handler.clone();
            self.tracker.spawn(execute(queue, handler, job, permit));
        }

        debug!(queue = %self.queue.name(), job_type = %self.job_type, "Worker stopped");
    }

    /// Wait for a runnable job. `None` once cancelled.
    async fn next_job(&self) -> Option<Job> {
        loop {
            let notified = self.queue.notify().notified();
            tokio::pin!(notified);
            // register before looking so a job added in between still wakes us
            notified.as_mut().enable();

            match self.queue.claim(&self.job_type) {
                Claim::Job(job) => return Some(job),
                Claim::NextAt(due) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                Claim::Idle => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = &mut notified => {}
                    }
                }
            }
        }
    }
}

enum Outcome {
    Done(Value),
    Failed(String),
    Stalled,
}

async fn execute(queue: Arc<Queue>, handler: Arc<dyn JobHandler>, job: Job, permit: OwnedSemaphorePermit) {
    let span = info_span!(
        "job",
        queue = %job.queue,
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = job.attempts_made + 1,
    );

    async move {
        let job_id = job.id.clone();
        let attempts_max = job.attempts_max;
        let stalled_ms = queue.config().stalled_interval_ms;
        let start = Instant::now();
        info!("Job started");

        let run = AssertUnwindSafe(handler.handle(job)).catch_unwind();
        let outcome = if stalled_ms > 0 {
            match tokio::time::timeout(Duration::from_millis(stalled_ms), run).await {
                Ok(result) => flatten(result),
                Err(_) => Outcome::Stalled,
            }
        } else {
            flatten(run.await)
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Outcome::Done(value) => {
                queue.complete(&job_id, value, elapsed_ms);
                info!(elapsed_ms, "Job completed");
            }
            Outcome::Failed(reason) => match queue.fail(&job_id, &reason) {
                Some(FailOutcome::Retrying(delay)) => warn!(
                    elapsed_ms,
                    error = %reason,
                    retry_in_ms = delay.as_millis() as u64,
                    "Job failed, will retry"
                ),
                Some(FailOutcome::Failed) => error!(
                    elapsed_ms,
                    error = %reason,
                    attempts_max,
                    "Job failed permanently"
                ),
                None => {}
            },
            Outcome::Stalled => match queue.stall(&job_id) {
                Some(StallOutcome::Requeued(count)) => {
                    warn!(elapsed_ms, stalled_count = count, "Job stalled, re-queued")
                }
                Some(StallOutcome::Failed) => {
                    error!(elapsed_ms, "Job stalled too many times, failed")
                }
                None => {}
            },
        }

        drop(permit);
    }
    .instrument(span)
    .await
}

fn flatten(result: std::thread::Result<Result<Value, JobError>>) -> Outcome {
    match result {
        Ok(Ok(value)) => Outcome::Done(value),
        Ok(Err(JobError::ExecutionFailed(reason))) => Outcome::Failed(reason),
        Ok(Err(e)) => Outcome::Failed(e.to_string()),
        Err(_) => Outcome::Failed("job handler panicked".to_string()),
    }
}
