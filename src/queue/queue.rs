//! In-process broker for one named queue.
//!
//! Jobs move through `waiting`/`delayed` → `active` → `completed`/`failed`.
//! Waiting jobs are ordered by priority (higher first) and then by arrival.
//! Delayed jobs become waiting once their due time passes. All transitions
//! happen under one short-lived lock; workers are woken through a `Notify`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::queue::{BulkJob, Job, JobError, JobEvent, JobOptions, JobState, QueueConfig};

const STALLED_REASON: &str = "job stalled more than allowable limit";

/// Cap for delays too large for `Instant`.
const MAX_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

fn due_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now + MAX_DELAY)
}

/// Point-in-time counts for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub paused: bool,
    /// Jobs completed since startup, including pruned ones.
    pub processed_total: u64,
    /// Jobs that failed for good since startup, including pruned ones.
    pub failed_total: u64,
}

/// Terminal jobs removed by a clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub completed: usize,
    pub failed: usize,
}

pub(crate) enum Claim {
    Job(Job),
    /// Nothing runnable now; the earliest delayed job is due at this instant.
    NextAt(Instant),
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FailOutcome {
    Retrying(Duration),
    Failed,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StallOutcome {
    Requeued(u32),
    Failed,
}

type WaitKey = (Reverse<i32>, u64);
type DelayKey = (Instant, u64);

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    waiting: BTreeMap<WaitKey, String>,
    delayed: BTreeMap<DelayKey, String>,
    active: HashSet<String>,
    completed: VecDeque<(String, Instant)>,
    failed: VecDeque<(String, Instant)>,
    paused: bool,
    seq: u64,
}

impl QueueState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn enqueue_waiting(&mut self, id: String, priority: i32) {
        let seq = self.next_seq();
        self.waiting.insert((Reverse(priority), seq), id);
    }

    fn enqueue_delayed(&mut self, id: String, due: Instant) {
        let seq = self.next_seq();
        self.delayed.insert((due, seq), id);
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let id = entry.remove();
            let priority = match self.jobs.get_mut(&id) {
                Some(job) => {
                    job.state = JobState::Waiting;
                    job.priority
                }
                None => continue,
            };
            self.enqueue_waiting(id, priority);
        }
    }

    fn finish_failed(&mut self, id: &str, keep: usize) {
        self.failed.push_back((id.to_string(), Instant::now()));
        prune(&mut self.failed, keep, &mut self.jobs);
    }
}

/// Drop the oldest terminal jobs beyond `keep`.
fn prune(finished: &mut VecDeque<(String, Instant)>, keep: usize, jobs: &mut HashMap<String, Job>) {
    while finished.len() > keep {
        if let Some((id, _)) = finished.pop_front() {
            jobs.remove(&id);
        }
    }
}

pub struct Queue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
    events: broadcast::Sender<JobEvent>,
    processed_total: AtomicU64,
    failed_total: AtomicU64,
}

impl Queue {
    pub fn new(config: QueueConfig, events: broadcast::Sender<JobEvent>) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            events,
            processed_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: JobEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn added(&self, job: &Job) {
        debug!(queue = %self.config.name, job_id = %job.id, job_type = %job.job_type, state = %job.state, "Job added");
        self.emit(JobEvent::Added {
            queue: self.config.name.clone(),
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
        });
    }

    /// Submit a job. Unset options take the queue defaults.
    pub fn add(&self, job_type: &str, payload: Value, options: JobOptions) -> Result<Job, JobError> {
        let (job, inserted) = self.insert(&mut self.lock(), job_type, payload, options, None)?;
        if inserted {
            self.notify.notify_waiters();
            self.added(&job);
        }
        Ok(job)
    }

    pub(crate) fn add_repeat(
        &self,
        job_type: &str,
        payload: Value,
        mut options: JobOptions,
        repeat_key: &str,
    ) -> Result<Job, JobError> {
        options.job_id = None;
        let (job, _) = self.insert(
            &mut self.lock(),
            job_type,
            payload,
            options,
            Some(repeat_key.to_string()),
        )?;
        self.notify.notify_waiters();
        self.added(&job);
        Ok(job)
    }

    /// Submit several jobs under one lock acquisition.
    pub fn add_bulk(&self, jobs: Vec<BulkJob>) -> Vec<Result<Job, JobError>> {
        let results: Vec<(Result<Job, JobError>, bool)> = {
            let mut state = self.lock();
            jobs.into_iter()
                .map(|item| {
                    match self.insert(&mut state, &item.job_type, item.payload, item.options, None) {
                        Ok((job, inserted)) => (Ok(job), inserted),
                        Err(e) => (Err(e), false),
                    }
                })
                .collect()
        };

        if results.iter().any(|(_, inserted)| *inserted) {
            self.notify.notify_waiters();
        }
        results
            .into_iter()
            .map(|(result, inserted)| {
                if let (Ok(job), true) = (&result, inserted) {
                    self.added(job);
                }
                result
            })
            .collect()
    }

    fn insert(
        &self,
        state: &mut QueueState,
        job_type: &str,
        payload: Value,
        options: JobOptions,
        repeat_key: Option<String>,
    ) -> Result<(Job, bool), JobError> {
        if job_type.trim().is_empty() {
            return Err(JobError::InvalidJob("job type is empty".to_string()));
        }
        if let Some(existing) = options.job_id.as_ref().and_then(|id| state.jobs.get(id)) {
            return Ok((existing.clone(), false));
        }

        let defaults = &self.config.default_job_options;
        let id = options.job_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let delay_ms = options.delay_ms.unwrap_or(0);
        let job = Job {
            id: id.clone(),
            queue: self.config.name.clone(),
            job_type: job_type.to_string(),
            payload,
            priority: options.priority.unwrap_or(defaults.priority),
            delay_ms,
            attempts_made: 0,
            attempts_max: options.attempts.unwrap_or(defaults.attempts).max(1),
            backoff: options.backoff.unwrap_or(defaults.backoff),
            state: if delay_ms > 0 {
                JobState::Delayed
            } else {
                JobState::Waiting
            },
            stalled_count: 0,
            created_at: Timestamp::now(),
            processed_on: None,
            finished_on: None,
            failed_reason: None,
            return_value: None,
            repeat_key,
        };

        if delay_ms > 0 {
            state.enqueue_delayed(id.clone(), due_after(Duration::from_millis(delay_ms)));
        } else {
            state.enqueue_waiting(id.clone(), job.priority);
        }
        state.jobs.insert(id, job.clone());
        Ok((job, true))
    }

    /// Move the next runnable job of `job_type` to active.
    pub(crate) fn claim(&self, job_type: &str) -> Claim {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.paused {
            return Claim::Idle;
        }

        let now = Instant::now();
        state.promote_due(now);

        let key = state
            .waiting
            .iter()
            .find(|(_, id)| {
                state
                    .jobs
                    .get(id.as_str())
                    .is_some_and(|job| job.job_type == job_type)
            })
            .map(|(key, _)| *key);

        let Some(id) = key.and_then(|key| state.waiting.remove(&key)) else {
            return match state.delayed.keys().next() {
                Some((due, _)) => Claim::NextAt(*due),
                None => Claim::Idle,
            };
        };

        let Some(job) = state.jobs.get_mut(&id) else {
            return Claim::Idle;
        };
        job.state = JobState::Active;
        job.processed_on = Some(Timestamp::now());
        let snapshot = job.clone();
        state.active.insert(id);
        drop(guard);

        self.emit(JobEvent::Active {
            queue: self.config.name.clone(),
            job_id: snapshot.id.clone(),
            attempt: snapshot.attempts_made + 1,
        });
        Claim::Job(snapshot)
    }

    pub(crate) fn complete(&self, id: &str, return_value: Value, elapsed_ms: u64) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if !state.active.remove(id) {
                return;
            }
            if let Some(job) = state.jobs.get_mut(id) {
                job.state = JobState::Completed;
                job.finished_on = Some(Timestamp::now());
                job.return_value = Some(return_value);
                job.failed_reason = None;
            }
            state.completed.push_back((id.to_string(), Instant::now()));
            prune(
                &mut state.completed,
                self.config.default_job_options.keep_completed,
                &mut state.jobs,
            );
        }

        self.processed_total.fetch_add(1, Ordering::Relaxed);
        self.emit(JobEvent::Completed {
            queue: self.config.name.clone(),
            job_id: id.to_string(),
            elapsed_ms,
        });
    }

    /// Record a failed attempt and apply the backoff policy.
    pub(crate) fn fail(&self, id: &str, reason: &str) -> Option<FailOutcome> {
        let (outcome, attempts_made) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if !state.active.remove(id) {
                return None;
            }
            let job = state.jobs.get_mut(id)?;
            job.attempts_made += 1;
            job.failed_reason = Some(reason.to_string());
            let attempts_made = job.attempts_made;

            if attempts_made < job.attempts_max {
                let delay = job.backoff.delay_for(attempts_made);
                let priority = job.priority;
                if delay.is_zero() {
                    job.state = JobState::Waiting;
                    state.enqueue_waiting(id.to_string(), priority);
                } else {
                    job.state = JobState::Delayed;
                    state.enqueue_delayed(id.to_string(), due_after(delay));
                }
                (FailOutcome::Retrying(delay), attempts_made)
            } else {
                job.state = JobState::Failed;
                job.finished_on = Some(Timestamp::now());
                state.finish_failed(id, self.config.default_job_options.keep_failed);
                (FailOutcome::Failed, attempts_made)
            }
        };

        let queue = self.config.name.clone();
        let job_id = id.to_string();
        match outcome {
            FailOutcome::Retrying(delay) => {
                self.notify.notify_waiters();
                self.emit(JobEvent::Retrying {
                    queue,
                    job_id,
                    attempts_made,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            FailOutcome::Failed => {
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                self.emit(JobEvent::Failed {
                    queue,
                    job_id,
                    attempts_made,
                    reason: reason.to_string(),
                });
            }
        }
        Some(outcome)
    }

    /// Handle a job whose handler overran the stall interval. The attempt
    /// does not count; the job is re-queued until it has stalled more than
    /// `max_stalled_count` times.
    pub(crate) fn stall(&self, id: &str) -> Option<StallOutcome> {
        let (outcome, stalled_count, attempts_made) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if !state.active.remove(id) {
                return None;
            }
            let job = state.jobs.get_mut(id)?;
            job.stalled_count += 1;
            let stalled_count = job.stalled_count;
            let attempts_made = job.attempts_made;

            if stalled_count > self.config.max_stalled_count {
                job.state = JobState::Failed;
                job.finished_on = Some(Timestamp::now());
                job.failed_reason = Some(STALLED_REASON.to_string());
                state.finish_failed(id, self.config.default_job_options.keep_failed);
                (StallOutcome::Failed, stalled_count, attempts_made)
            } else {
                job.state = JobState::Waiting;
                let priority = job.priority;
                state.enqueue_waiting(id.to_string(), priority);
                (StallOutcome::Requeued(stalled_count), stalled_count, attempts_made)
            }
        };

        self.emit(JobEvent::Stalled {
            queue: self.config.name.clone(),
            job_id: id.to_string(),
            stalled_count,
        });
        match outcome {
            StallOutcome::Requeued(_) => self.notify.notify_waiters(),
            StallOutcome::Failed => {
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                self.emit(JobEvent::Failed {
                    queue: self.config.name.clone(),
                    job_id: id.to_string(),
                    attempts_made,
                    reason: STALLED_REASON.to_string(),
                });
            }
        }
        Some(outcome)
    }

    /// Stop handing out jobs. Active jobs run to completion.
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            waiting: state.waiting.len(),
            active: state.active.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            delayed: state.delayed.len(),
            paused: state.paused,
            processed_total: self.processed_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
        }
    }

    /// Remove completed and failed jobs that finished at least `grace`
    /// ago.
    pub fn clean(&self, grace: Duration) -> CleanReport {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(cutoff) = Instant::now().checked_sub(grace) else {
            return CleanReport::default();
        };

        let mut drain = |finished: &mut VecDeque<(String, Instant)>| {
            let mut removed = 0;
            while finished.front().is_some_and(|(_, at)| *at <= cutoff) {
                if let Some((id, _)) = finished.pop_front() {
                    state.jobs.remove(&id);
                    removed += 1;
                }
            }
            removed
        };
        let completed = drain(&mut state.completed);
        let failed = drain(&mut state.failed);

        CleanReport { completed, failed }
    }

    /// Put a failed job back to waiting with its attempts reset.
    pub fn retry(&self, id: &str) -> Result<Job, JobError> {
        let snapshot = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let job = state.jobs.get_mut(id).ok_or_else(|| JobError::NotFound {
                queue: self.config.name.clone(),
                id: id.to_string(),
            })?;
            if job.state != JobState::Failed {
                return Err(JobError::InvalidState {
                    id: id.to_string(),
                    state: job.state,
                    expected: JobState::Failed,
                });
            }
            job.state = JobState::Waiting;
            job.attempts_made = 0;
            job.stalled_count = 0;
            job.failed_reason = None;
            job.finished_on = None;
            let snapshot = job.clone();

            state.failed.retain(|(failed_id, _)| failed_id != id);
            state.enqueue_waiting(id.to_string(), snapshot.priority);
            snapshot
        };

        self.notify.notify_waiters();
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }
}
