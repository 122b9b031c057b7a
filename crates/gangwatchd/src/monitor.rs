//! Monitor - schedules update cycles and the daily boundary trigger.
//!
//! Two background tasks share one tracker behind a mutex:
//! - the poll loop (fetch + cycle every `poll_interval_secs`)
//! - the boundary task (sleeps until the next local reset hour, then forces
//!   the daily reset)
//!
//! The fetch runs while the lock is held, so at most one cycle is in flight
//! and cycles never interleave with resets.

use chrono::{DateTime, Utc};
use gangwatch_shared::standings::{rank_changes, significant_changes};
use gangwatch_shared::{BoundaryClock, ChangeRecord, ReportSnapshot, TrackerError};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ScheduleConfig};
use crate::fetcher::SnapshotSource;
use crate::tracker::{CycleOutcome, Tracker};

/// Tracker shared between the scheduled tasks
pub type SharedTracker = Arc<Mutex<Tracker>>;

/// Event channel capacity
const EVENT_CAPACITY: usize = 64;

/// Sleep used when no next boundary can be computed
const BOUNDARY_RETRY: Duration = Duration::from_secs(3600);

/// Consecutive failure counter for the poll loop
#[derive(Debug, Clone, Copy)]
pub struct ErrorStreak {
    count: u32,
    max: u32,
}

impl ErrorStreak {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max: max.max(1) }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.max
    }

    /// Count a failure. Returns true once the streak reaches the limit,
    /// in which case the counter starts over.
    pub fn record_failure(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.max {
            self.count = 0;
            return true;
        }
        false
    }

    pub fn record_success(&mut self) {
        self.count = 0;
    }
}

/// Time left until the next local reset hour
pub fn delay_until_next_boundary(clock: &BoundaryClock, now: DateTime<Utc>) -> Duration {
    match clock.next_daily_boundary(&clock.local(&now)) {
        Some(next) => (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1)),
        None => BOUNDARY_RETRY,
    }
}

/// Published after cycles and resets
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A cycle produced changes
    Changes(Vec<ChangeRecord>),
    /// A window closed
    Report(ReportSnapshot),
}

#[derive(Clone)]
pub struct Monitor {
    tracker: SharedTracker,
    source: Arc<dyn SnapshotSource>,
    clock: BoundaryClock,
    schedule: ScheduleConfig,
    significant_xp: u64,
    fetch_timeout: Duration,
    events: broadcast::Sender<TrackerEvent>,
}

impl Monitor {
    pub fn new(tracker: Tracker, source: Arc<dyn SnapshotSource>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let clock = tracker.clock().clone();

        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            source,
            clock,
            schedule: config.schedule.clone(),
            significant_xp: config.alerts.significant_xp,
            // Outer bound; the HTTP client carries its own timeout as well
            fetch_timeout: Duration::from_secs(config.source.timeout_secs.max(1) + 1),
            events,
        }
    }

    pub fn tracker(&self) -> SharedTracker {
        Arc::clone(&self.tracker)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Fetch and run one cycle. A failed fetch leaves all state untouched.
    pub async fn run_once(&self) -> Result<CycleOutcome, TrackerError> {
        let outcome = {
            let mut tracker = self.tracker.lock().await;
            let snapshot = match timeout(self.fetch_timeout, self.source.fetch()).await {
                Ok(result) => result?,
                Err(_) => return Err(TrackerError::Timeout(self.fetch_timeout.as_secs())),
            };
            tracker.run_cycle(snapshot, Utc::now())?
        };

        self.publish(&outcome);
        Ok(outcome)
    }

    /// Startup catch-up for boundaries missed while stopped
    pub async fn catch_up(&self) -> Vec<ReportSnapshot> {
        if !self.schedule.catch_up_missed {
            debug!("Missed-boundary catch-up disabled");
            return Vec::new();
        }

        let reports = self.tracker.lock().await.catch_up(Utc::now());
        for report in &reports {
            self.send(TrackerEvent::Report(report.clone()));
        }
        reports
    }

    /// Daily reset that skips the time-of-day rule (once per local date)
    pub async fn force_daily_reset(&self) -> Option<ReportSnapshot> {
        let report = self.tracker.lock().await.force_daily_reset(Utc::now());
        if let Some(report) = &report {
            info!("Daily report generated for {}", report.period.id);
            self.send(TrackerEvent::Report(report.clone()));
        }
        report
    }

    /// Spawn the poll loop and the boundary task
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        vec![self.spawn_poll_task(), self.spawn_boundary_task()]
    }

    fn spawn_poll_task(&self) -> JoinHandle<()> {
        let monitor = self.clone();
        let poll_secs = self.schedule.poll_interval_secs.max(1);
        let max_errors = self.schedule.max_consecutive_errors;
        let backoff = Duration::from_secs(self.schedule.error_backoff_secs);

        info!("Poll task started (interval: {}s)", poll_secs);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(poll_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut streak = ErrorStreak::new(max_errors);

            loop {
                ticker.tick().await;

                match monitor.run_once().await {
                    Ok(outcome) => {
                        streak.record_success();
                        if outcome.storage_errors > 0 {
                            warn!("Cycle completed with {} storage errors", outcome.storage_errors);
                        }
                    }
                    Err(e) => {
                        let exhausted = streak.record_failure();
                        let failures = if exhausted { streak.limit() } else { streak.count() };
                        error!("Update cycle failed ({}/{}): {}", failures, streak.limit(), e);

                        if exhausted {
                            warn!(
                                "Too many consecutive errors, pausing for {}s",
                                backoff.as_secs()
                            );
                            sleep(backoff).await;
                            ticker.reset();
                        }
                    }
                }
            }
        })
    }

    fn spawn_boundary_task(&self) -> JoinHandle<()> {
        let monitor = self.clone();

        info!(
            "Daily boundary task started ({:02}:00 {})",
            self.clock.reset_hour(),
            self.clock.tz().name()
        );

        tokio::spawn(async move {
            loop {
                let delay = delay_until_next_boundary(&monitor.clock, Utc::now());
                debug!("Next daily boundary in {}s", delay.as_secs());
                sleep(delay).await;
                monitor.force_daily_reset().await;
            }
        })
    }

    fn publish(&self, outcome: &CycleOutcome) {
        for change in significant_changes(&outcome.changes, self.significant_xp) {
            info!("Significant XP change: {}", change.format());
        }
        for change in rank_changes(&outcome.changes) {
            if change.climbed() {
                info!("{} climbed to #{}", change.name, change.new_rank);
            } else {
                info!("{} dropped to #{}", change.name, change.new_rank);
            }
        }

        for report in &outcome.reports {
            self.send(TrackerEvent::Report(report.clone()));
        }
        if !outcome.changes.is_empty() {
            self.send(TrackerEvent::Changes(outcome.changes.clone()));
        }
    }

    fn send(&self, event: TrackerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Tehran;

    fn clock() -> BoundaryClock {
        BoundaryClock::new(Tehran)
    }

    fn utc(d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Tehran
            .with_ymd_and_hms(2026, 3, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_streak_backs_off_at_limit() {
        let mut streak = ErrorStreak::new(3);
        assert!(!streak.record_failure());
        assert!(!streak.record_failure());
        assert!(streak.record_failure());
        assert_eq!(streak.limit(), 3);
        // Counter starts over after a back-off
        assert_eq!(streak.count(), 0);
        assert!(!streak.record_failure());
    }

    #[test]
    fn test_streak_success_clears_count() {
        let mut streak = ErrorStreak::new(2);
        assert!(!streak.record_failure());
        streak.record_success();
        assert!(!streak.record_failure());
        assert!(streak.record_failure());
    }

    #[test]
    fn test_streak_zero_limit_backs_off_every_failure() {
        let mut streak = ErrorStreak::new(0);
        assert!(streak.record_failure());
        assert!(streak.record_failure());
    }

    #[test]
    fn test_delay_until_same_day_boundary() {
        let delay = delay_until_next_boundary(&clock(), utc(10, 6, 30));
        assert_eq!(delay, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_delay_after_boundary_waits_for_tomorrow() {
        let delay = delay_until_next_boundary(&clock(), utc(10, 7, 0));
        assert_eq!(delay, Duration::from_secs(24 * 3600));

        let delay = delay_until_next_boundary(&clock(), utc(10, 22, 0));
        assert_eq!(delay, Duration::from_secs(9 * 3600));
    }
}
