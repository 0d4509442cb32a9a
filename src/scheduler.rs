use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Timelike};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Minutes past the hour at which ticks fire.
pub const TICK_MINUTES: [u32; 2] = [1, 31];

/// Spacing between consecutive ticks.
pub const TICK_PERIOD_MINUTES: i64 = 30;

/// Daily time-of-day range in which ticks do real work. Both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl OperatingWindow {
    /// `None` when `start` is after `end`; windows never wrap past midnight.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn all_day() -> Self {
        Self {
            start: NaiveTime::default(),
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default(),
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

/// First :01 or :31 mark strictly after `now`.
pub fn next_run_after(now: NaiveDateTime) -> NaiveDateTime {
    let hour = now
        .date()
        .and_hms_opt(now.hour(), 0, 0)
        .unwrap_or(now);

    let mut target = if now.minute() < TICK_MINUTES[0] {
        hour + ChronoDuration::minutes(i64::from(TICK_MINUTES[0]))
    } else if now.minute() < TICK_MINUTES[1] {
        hour + ChronoDuration::minutes(i64::from(TICK_MINUTES[1]))
    } else {
        hour + ChronoDuration::hours(1) + ChronoDuration::minutes(i64::from(TICK_MINUTES[0]))
    };

    while target <= now {
        target += ChronoDuration::minutes(TICK_PERIOD_MINUTES);
    }
    target
}

/// Time to sleep from `now` until the next aligned tick.
pub fn initial_delay(now: NaiveDateTime) -> Duration {
    (next_run_after(now) - now).to_std().unwrap_or(Duration::ZERO)
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Work performed on every tick inside the operating window.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run(&self, scheduled_for: NaiveDateTime) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    pub ticks_skipped: u64,
    pub last_run: Option<NaiveDateTime>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownStatus {
    /// The loop finished within the first grace period.
    Graceful,
    /// The loop was aborted and wound down within the second period.
    Forced,
    /// Neither period was enough.
    Unclean,
}

pub struct PriceScheduler {
    job: Arc<dyn ScheduledJob>,
    window: OperatingWindow,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<SchedulerStats>>,
}

impl PriceScheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, window: OperatingWindow, clock: Arc<dyn Clock>) -> Self {
        Self {
            job,
            window,
            clock,
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
        }
    }

    /// Spawns the tick loop. Ticks run one at a time on the spawned task.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let stats = Arc::clone(&self.stats);
        let token = cancel.clone();

        let join = tokio::spawn(async move { self.run_loop(token).await });
        tracing::info!("Price scheduler started");

        SchedulerHandle { cancel, join, stats }
    }

    async fn run_loop(self, cancel: CancellationToken) {
        loop {
            let now = self.clock.now();
            let next_run = next_run_after(now);
            let delay = initial_delay(now);
            tracing::debug!(next_run = %next_run, delay_secs = delay.as_secs(), "Waiting for next tick");

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Price scheduler stopping, no further ticks");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.tick(next_run).await;
        }
    }

    async fn tick(&self, scheduled_for: NaiveDateTime) -> TickStatus {
        let time_of_day = self.clock.now().time();
        if !self.window.contains(time_of_day) {
            tracing::info!(
                scheduled_for = %scheduled_for,
                window_start = %self.window.start(),
                window_end = %self.window.end(),
                "Outside operating window, skipping tick"
            );
            self.record(TickStatus::Skipped, scheduled_for, None).await;
            return TickStatus::Skipped;
        }

        tracing::debug!(scheduled_for = %scheduled_for, "Starting scheduled tick");

        let (status, error) = match AssertUnwindSafe(self.job.run(scheduled_for)).catch_unwind().await {
            Ok(Ok(())) => (TickStatus::Completed, None),
            Ok(Err(e)) => {
                tracing::error!(scheduled_for = %scheduled_for, error = ?e, "Scheduled tick failed");
                (TickStatus::Failed, Some(e.to_string()))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(scheduled_for = %scheduled_for, panic = %message, "Scheduled tick panicked");
                (TickStatus::Failed, Some(message))
            }
        };

        self.record(status, scheduled_for, error).await;
        status
    }

    async fn record(&self, status: TickStatus, scheduled_for: NaiveDateTime, error: Option<String>) {
        let label = match status {
            TickStatus::Completed => "completed",
            TickStatus::Failed => "failed",
            TickStatus::Skipped => "skipped",
        };
        metrics::counter!("fuel_watcher_ticks_total", "status" => label).increment(1);

        let mut stats = self.stats.write().await;
        match status {
            TickStatus::Completed => stats.ticks_completed += 1,
            TickStatus::Failed => {
                stats.ticks_failed += 1;
                stats.last_error = error;
            }
            TickStatus::Skipped => stats.ticks_skipped += 1,
        }
        if status != TickStatus::Skipped {
            stats.last_run = Some(scheduled_for);
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Running scheduler. Dropping the handle leaves the loop running.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<RwLock<SchedulerStats>>,
}

impl SchedulerHandle {
    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops accepting ticks, then waits up to `grace` for an in-flight tick.
    /// If that runs out the loop is aborted and given `force_grace` to unwind.
    pub async fn shutdown(self, grace: Duration, force_grace: Duration) -> ShutdownStatus {
        let SchedulerHandle { cancel, mut join, .. } = self;
        cancel.cancel();

        match tokio::time::timeout(grace, &mut join).await {
            Ok(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Scheduler task ended abnormally");
                }
                tracing::info!("Price scheduler shutdown");
                return ShutdownStatus::Graceful;
            }
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs(), "In-flight tick did not finish in time, aborting");
            }
        }

        join.abort();
        match tokio::time::timeout(force_grace, &mut join).await {
            Ok(_) => {
                tracing::warn!("Price scheduler force-stopped");
                ShutdownStatus::Forced
            }
            Err(_) => {
                tracing::warn!(
                    force_grace_secs = force_grace.as_secs(),
                    "Price scheduler did not stop after abort, shutdown is unclean"
                );
                ShutdownStatus::Unclean
            }
        }
    }
}
