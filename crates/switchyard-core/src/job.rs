//! Job descriptors and scheduled jobs.
//!
//! A [`JobDescriptor`] is the time-triggered counterpart of a trigger
//! descriptor: it stamps a schedule, an optional target scope and scheduler
//! options onto a method. Discovery binds the method to its plugin instance
//! and produces a [`ScheduledJob`], which the scheduler collaborator runs.
//!
//! All calendar schedules are evaluated in UTC.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Utc, Weekday};
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::{BoxError, DiscoveryError, DiscoveryResult};
use crate::id::JobId;

/// When a job fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// Fire once, a delay after registration.
    OnceAfter(Duration),
    /// Fire once at a fixed instant.
    OnceAt(DateTime<Utc>),
    /// Fire every `interval`, starting `first` after registration.
    Repeating {
        interval: Duration,
        first: Option<Duration>,
        last: Option<DateTime<Utc>>,
    },
    /// Fire every day at `time`; an empty `days` list means every weekday.
    Daily { time: NaiveTime, days: Vec<Weekday> },
    /// Fire on `day` of every month at `time`. Months without that day are skipped.
    Monthly { time: NaiveTime, day: u32 },
    /// A cron expression interpreted by the scheduler.
    Custom { cron: String },
}

impl Schedule {
    /// Short lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnceAfter(_) | Self::OnceAt(_) => "once",
            Self::Repeating { .. } => "repeating",
            Self::Daily { .. } => "daily",
            Self::Monthly { .. } => "monthly",
            Self::Custom { .. } => "custom",
        }
    }

    /// Rejects parameters that can never fire.
    pub fn validate(&self, method: &'static str) -> DiscoveryResult<()> {
        match self {
            Self::Repeating { interval, .. } if interval.is_zero() => Err(
                DiscoveryError::invalid_schedule(method, "repeating interval must be non-zero"),
            ),
            Self::Monthly { day, .. } if !(1..=31).contains(day) => Err(
                DiscoveryError::invalid_schedule(method, format!("day of month {day} out of range")),
            ),
            Self::Custom { cron } if cron.trim().is_empty() => Err(
                DiscoveryError::invalid_schedule(method, "empty cron expression"),
            ),
            _ => Ok(()),
        }
    }

    /// First fire time for a job registered at `now`.
    ///
    /// Returns `None` when the job will never fire, or when the schedule is
    /// [`Custom`](Self::Custom) and left to the scheduler to interpret.
    pub fn first_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OnceAfter(delay) => now.checked_add_signed(TimeDelta::from_std(*delay).ok()?),
            Self::OnceAt(at) => (*at > now).then_some(*at),
            Self::Repeating { first, last, .. } => {
                let delay = TimeDelta::from_std(first.unwrap_or_default()).ok()?;
                let at = now.checked_add_signed(delay)?;
                last.is_none_or(|last| at <= last).then_some(at)
            }
            Self::Daily { .. } | Self::Monthly { .. } => self.next_fire(now),
            Self::Custom { .. } => None,
        }
    }

    /// Fire time following a fire at `previous`.
    pub fn next_fire(&self, previous: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::OnceAfter(_) | Self::OnceAt(_) | Self::Custom { .. } => None,
            Self::Repeating { interval, last, .. } => {
                let at = previous.checked_add_signed(TimeDelta::from_std(*interval).ok()?)?;
                last.is_none_or(|last| at <= last).then_some(at)
            }
            Self::Daily { time, days } => (0..=7u64)
                .filter_map(|offset| previous.date_naive().checked_add_days(Days::new(offset)))
                .filter(|date| days.is_empty() || days.contains(&date.weekday()))
                .map(|date| date.and_time(*time).and_utc())
                .find(|at| *at > previous),
            Self::Monthly { time, day } => {
                let (year, month) = (previous.year(), previous.month0());
                (0..=48)
                    .filter_map(|step| {
                        let months = month + step;
                        let y = year + (months / 12) as i32;
                        NaiveDate::from_ymd_opt(y, months % 12 + 1, *day)
                    })
                    .map(|date| date.and_time(*time).and_utc())
                    .find(|at| *at > previous)
            }
        }
    }
}

/// Metadata describing one scheduled job on one method.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    schedule: Schedule,
    name: Option<String>,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    data: Option<Value>,
    options: Map<String, Value>,
}

impl JobDescriptor {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            name: None,
            chat_id: None,
            user_id: None,
            data: None,
            options: Map::new(),
        }
    }

    pub fn once_after(delay: Duration) -> Self {
        Self::new(Schedule::OnceAfter(delay))
    }

    pub fn once_at(at: DateTime<Utc>) -> Self {
        Self::new(Schedule::OnceAt(at))
    }

    pub fn repeating(interval: Duration) -> Self {
        Self::new(Schedule::Repeating {
            interval,
            first: None,
            last: None,
        })
    }

    pub fn daily(time: NaiveTime) -> Self {
        Self::new(Schedule::Daily {
            time,
            days: Vec::new(),
        })
    }

    pub fn monthly(time: NaiveTime, day: u32) -> Self {
        Self::new(Schedule::Monthly { time, day })
    }

    pub fn custom(cron: impl Into<String>) -> Self {
        Self::new(Schedule::Custom { cron: cron.into() })
    }

    /// Delay before the first run of a repeating job. Ignored by other schedules.
    pub fn first(mut self, delay: Duration) -> Self {
        if let Schedule::Repeating { first, .. } = &mut self.schedule {
            *first = Some(delay);
        }
        self
    }

    /// Last instant a repeating job may fire. Ignored by other schedules.
    pub fn last(mut self, at: DateTime<Utc>) -> Self {
        if let Schedule::Repeating { last, .. } = &mut self.schedule {
            *last = Some(at);
        }
        self
    }

    /// Restricts a daily job to the given weekdays. Ignored by other schedules.
    pub fn on_days(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        if let Schedule::Daily { days, .. } = &mut self.schedule {
            days.extend(weekdays);
        }
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Adds a scheduler option forwarded verbatim.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn job_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn payload(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

/// What a job callback receives when it fires.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub name: String,
    pub chat_id: Option<i64>,
    pub user_id: Option<i64>,
    pub data: Option<Value>,
    pub fired_at: DateTime<Utc>,
}

/// A job callback bound to its plugin instance.
pub type JobCallback =
    Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A job ready to hand to the scheduler.
#[derive(Clone)]
pub struct ScheduledJob {
    id: JobId,
    name: String,
    descriptor: Arc<JobDescriptor>,
    callback: JobCallback,
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schedule", self.descriptor.schedule())
            .finish()
    }
}

impl ScheduledJob {
    /// Validates the descriptor's schedule and binds `callback` to it.
    ///
    /// `default_name` is used when the descriptor carries no explicit name.
    pub fn new(
        method: &'static str,
        default_name: String,
        descriptor: Arc<JobDescriptor>,
        callback: JobCallback,
    ) -> DiscoveryResult<Self> {
        descriptor.schedule().validate(method)?;
        let name = descriptor
            .job_name()
            .map(str::to_string)
            .unwrap_or(default_name);
        Ok(Self {
            id: JobId::next(),
            name,
            descriptor,
            callback,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn schedule(&self) -> &Schedule {
        self.descriptor.schedule()
    }

    /// Runs the job once, as of `fired_at`.
    pub async fn run(&self, fired_at: DateTime<Utc>) -> Result<(), BoxError> {
        let ctx = JobContext {
            name: self.name.clone(),
            chat_id: self.descriptor.chat_id(),
            user_id: self.descriptor.user_id(),
            data: self.descriptor.payload().cloned(),
            fired_at,
        };
        (self.callback)(ctx).await
    }
}
