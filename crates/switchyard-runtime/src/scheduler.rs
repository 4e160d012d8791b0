//! Tokio-backed job scheduler.
//!
//! Every registered job gets its own task sleeping until the next fire time.
//! Built-in schedules compute fire times with [`Schedule::next_fire`];
//! [`Schedule::Custom`] cron expressions are evaluated here in UTC, with
//! five-field expressions accepted by prepending a seconds field.
//!
//! Cancelling a job, or dropping the scheduler, stops its task before the
//! next fire. A run already in progress is allowed to finish.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use switchyard_core::{JobId, Schedule, ScheduledJob, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, warn};

/// A live job task. `generation` tells apart successive registrations of
/// the same job.
#[derive(Debug)]
struct Registration {
    generation: u64,
    token: CancellationToken,
}

type Tokens = Arc<Mutex<HashMap<JobId, Registration>>>;

/// [`Scheduler`] running each job on a tokio task.
///
/// `register` must be called from within a tokio runtime.
#[derive(Debug, Default)]
pub struct TokioScheduler {
    tokens: Tokens,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs whose task is still alive.
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scheduled(&self, job: &ScheduledJob) -> bool {
        self.tokens.lock().contains_key(&job.id())
    }

    /// Cancels every job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.tokens.lock().clear();
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn register(&self, job: ScheduledJob) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(job = job.name(), "no tokio runtime, job not scheduled");
            return;
        };

        let (generation, token) = {
            let mut tokens = self.tokens.lock();
            if tokens.contains_key(&job.id()) {
                return;
            }
            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            let token = self.shutdown.child_token();
            tokens.insert(
                job.id(),
                Registration {
                    generation,
                    token: token.clone(),
                },
            );
            (generation, token)
        };

        let tokens = Arc::clone(&self.tokens);
        handle.spawn(async move {
            let id = job.id();
            drive(job, token).await;
            // The job may have been cancelled and registered again meanwhile.
            let mut tokens = tokens.lock();
            if tokens.get(&id).is_some_and(|r| r.generation == generation) {
                tokens.remove(&id);
            }
        });
    }

    fn cancel(&self, job: &ScheduledJob) -> bool {
        match self.tokens.lock().remove(&job.id()) {
            Some(registration) => {
                registration.token.cancel();
                debug!(job = job.name(), "job cancelled");
                true
            }
            None => false,
        }
    }
}

/// Next fire strictly after `after` for a cron expression.
pub fn next_cron_fire(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = expression.trim();
    let schedule = if normalized.split_whitespace().count() == 5 {
        cron::Schedule::from_str(&format!("0 {normalized}"))
    } else {
        cron::Schedule::from_str(normalized)
    };
    match schedule {
        Ok(schedule) => schedule.after(&after).next(),
        Err(e) => {
            warn!(cron = normalized, error = %e, "invalid cron expression");
            None
        }
    }
}

fn first_fire(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Custom { cron } => next_cron_fire(cron, now),
        other => other.first_fire(now),
    }
}

fn next_fire(schedule: &Schedule, previous: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Custom { cron } => next_cron_fire(cron, previous),
        other => other.next_fire(previous),
    }
}

async fn drive(job: ScheduledJob, token: CancellationToken) {
    let mut next = first_fire(job.schedule(), Utc::now());
    if next.is_none() {
        debug!(job = job.name(), schedule = job.schedule().as_str(), "job will never fire");
    }

    while let Some(at) = next {
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let span = debug_span!("job", job = job.name(), fired_at = %at);
        if let Err(e) = job.run(at).instrument(span).await {
            error!(job = job.name(), error = %e, "job failed");
        }
        next = next_fire(job.schedule(), at);
    }
    debug!(job = job.name(), "job finished");
}
