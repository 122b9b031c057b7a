//! Update orchestrator - owns all tracker state and drives one cycle.
//!
//! A cycle: validate + rank the snapshot, swap it in as the new baseline,
//! run the three boundary checks (freeze + reset as needed), seed the daily
//! window on the very first cycle, diff, aggregate, persist. Storage
//! failures are logged and counted; they never roll back memory state.
//!
//! Callers serialize access (see `monitor::SharedTracker`); nothing in here
//! is shared between threads.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gangwatch_shared::report::{freeze, ReportPeriod};
use gangwatch_shared::standings::{build_standings, Standing};
use gangwatch_shared::{
    diff, rerank, validate_snapshot, AggregateEntry, BoundaryClock, BoundaryState, ChangeRecord,
    EntityRecord, Granularity, ReportSnapshot, TaskDetector, TrackerError, WindowAggregate,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::{JsonStore, SnapshotFile, WindowFile};

/// Result of one update cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Per-entity changes, in snapshot order
    pub changes: Vec<ChangeRecord>,
    /// Reports frozen by boundaries crossed during this cycle
    pub reports: Vec<ReportSnapshot>,
    /// The previous baseline was empty
    pub first_cycle: bool,
    /// Durable writes that failed during this cycle
    pub storage_errors: usize,
}

/// Live state of one window
#[derive(Debug, Clone)]
struct Window {
    aggregate: WindowAggregate,
    boundary: BoundaryState,
    last_report: Option<ReportSnapshot>,
}

impl Window {
    fn from_file(file: WindowFile) -> Self {
        Self {
            aggregate: WindowAggregate::from_entries(file.granularity, file.entries),
            boundary: BoundaryState {
                last_reset: file.last_reset,
            },
            last_report: file.last_report,
        }
    }

    fn to_file(&self) -> WindowFile {
        WindowFile {
            granularity: self.aggregate.granularity,
            entries: self.aggregate.entries.clone(),
            last_reset: self.boundary.last_reset,
            last_report: self.last_report.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Windows {
    daily: Window,
    weekly: Window,
    monthly: Window,
}

impl Windows {
    fn get(&self, granularity: Granularity) -> &Window {
        match granularity {
            Granularity::Daily => &self.daily,
            Granularity::Weekly => &self.weekly,
            Granularity::Monthly => &self.monthly,
        }
    }

    fn get_mut(&mut self, granularity: Granularity) -> &mut Window {
        match granularity {
            Granularity::Daily => &mut self.daily,
            Granularity::Weekly => &mut self.weekly,
            Granularity::Monthly => &mut self.monthly,
        }
    }
}

/// Per-window status line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStatus {
    pub granularity: Granularity,
    pub entries: usize,
    pub total_xp: u64,
    pub last_reset: Option<DateTime<Utc>>,
    pub last_report_period: Option<String>,
}

/// Tracker overview for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStatus {
    pub entities: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub timezone: String,
    pub windows: Vec<WindowStatus>,
}

/// Snapshot tracker with daily, weekly and monthly windows
pub struct Tracker {
    clock: BoundaryClock,
    detector: Box<dyn TaskDetector>,
    store: JsonStore,
    entities: Vec<EntityRecord>,
    last_update: Option<DateTime<Utc>>,
    windows: Windows,
    catch_up_missed: bool,
}

impl Tracker {
    /// Restore state from the store (missing files start empty)
    pub fn open(
        store: JsonStore,
        clock: BoundaryClock,
        detector: Box<dyn TaskDetector>,
    ) -> Result<Self, TrackerError> {
        let snapshot = store.load_snapshot()?;
        let windows = Windows {
            daily: Window::from_file(store.load_window(Granularity::Daily)?),
            weekly: Window::from_file(store.load_window(Granularity::Weekly)?),
            monthly: Window::from_file(store.load_window(Granularity::Monthly)?),
        };

        info!(
            "Tracker loaded from {}: {} gangs, {} daily / {} weekly / {} monthly entries",
            store.root().display(),
            snapshot.entities.len(),
            windows.daily.aggregate.len(),
            windows.weekly.aggregate.len(),
            windows.monthly.aggregate.len()
        );

        Ok(Self {
            clock,
            detector,
            store,
            entities: snapshot.entities,
            last_update: snapshot.last_update,
            windows,
            catch_up_missed: true,
        })
    }

    /// Close windows whose boundary passed between two cycles (default on)
    pub fn with_catch_up(mut self, enabled: bool) -> Self {
        self.catch_up_missed = enabled;
        self
    }

    /// Run one full update cycle for a freshly fetched snapshot
    pub fn run_cycle(
        &mut self,
        snapshot: Vec<EntityRecord>,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, TrackerError> {
        validate_snapshot(&snapshot)?;
        let current = rerank(snapshot);

        let previous = std::mem::replace(&mut self.entities, current);
        self.last_update = Some(now);

        let mut outcome = CycleOutcome {
            first_cycle: previous.is_empty(),
            ..Default::default()
        };
        self.persist_snapshot(&mut outcome);

        let local = self.clock.local(&now);
        for granularity in Granularity::ALL {
            if let Some(report) = self.check_boundary(granularity, &local, now, &mut outcome) {
                outcome.reports.push(report);
            }
        }

        if outcome.first_cycle {
            info!("First data load - establishing baseline for {} gangs", self.entities.len());
            self.windows.daily.aggregate.seed(&self.entities);
        }

        let changes = diff(&previous, &self.entities);
        if !changes.is_empty() {
            for granularity in Granularity::ALL {
                self.windows
                    .get_mut(granularity)
                    .aggregate
                    .apply(&changes, &local, self.detector.as_ref());
            }
            info!("Updated gang data, {} changes detected", changes.len());
        } else {
            debug!("Gang data updated, no changes detected");
        }

        for granularity in Granularity::ALL {
            self.persist_window(granularity, &mut outcome);
        }

        outcome.changes = changes;
        Ok(outcome)
    }

    /// Boundary-aligned daily reset that skips the time-of-day rule.
    ///
    /// Fires at most once per local date; on an uninitialized state it only
    /// records the baseline.
    pub fn force_daily_reset(&mut self, now: DateTime<Utc>) -> Option<ReportSnapshot> {
        let local = self.clock.local(&now);
        let mut outcome = CycleOutcome::default();
        let last = self.clock.local_last_reset(&self.windows.daily.boundary);

        let report = match last {
            None => {
                self.record_baseline(Granularity::Daily, now, &mut outcome);
                None
            }
            Some(last) if self.clock.should_force_daily(&local, Some(&last)) => {
                Some(self.close_window(Granularity::Daily, &local, now, now, &mut outcome))
            }
            Some(_) => {
                debug!("Forced daily reset skipped: already reset on {}", local.date_naive());
                None
            }
        };

        if outcome.storage_errors > 0 {
            warn!("Forced daily reset finished with {} storage errors", outcome.storage_errors);
        }
        report
    }

    /// Apply resets for boundaries that passed while the daemon was down
    pub fn catch_up(&mut self, now: DateTime<Utc>) -> Vec<ReportSnapshot> {
        let local = self.clock.local(&now);
        let mut outcome = CycleOutcome::default();
        let mut reports = Vec::new();

        for granularity in Granularity::ALL {
            let boundary = self.windows.get(granularity).boundary;
            let Some(last) = self.clock.local_last_reset(&boundary) else {
                continue;
            };
            let report = self.close_overdue(granularity, &local, &last, now, &mut outcome);
            reports.extend(report);
        }

        reports
    }

    fn check_boundary(
        &mut self,
        granularity: Granularity,
        local: &DateTime<Tz>,
        now: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) -> Option<ReportSnapshot> {
        let Some(last) = self.clock.local_last_reset(&self.windows.get(granularity).boundary)
        else {
            self.record_baseline(granularity, now, outcome);
            return None;
        };

        if self.clock.should_reset(granularity, local, Some(&last)) {
            // Anchor the reset to the boundary so poll jitter never accumulates
            let reset_at = self
                .clock
                .last_boundary(granularity, local)
                .map(|b| b.with_timezone(&Utc))
                .unwrap_or(now);
            return Some(self.close_window(granularity, local, now, reset_at, outcome));
        }

        if !self.catch_up_missed {
            return None;
        }
        self.close_overdue(granularity, local, &last, now, outcome)
    }

    /// Close a window whose boundary passed without a cycle inside its minute
    fn close_overdue(
        &mut self,
        granularity: Granularity,
        local: &DateTime<Tz>,
        last: &DateTime<Tz>,
        now: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) -> Option<ReportSnapshot> {
        let boundary = self.clock.overdue_boundary(granularity, local, Some(last))?;
        info!(
            "Missed {} boundary at {}, catching up",
            granularity,
            boundary.format("%Y-%m-%d %H:%M %Z")
        );
        let reset_at = boundary.with_timezone(&Utc);
        Some(self.close_window(granularity, &boundary, now, reset_at, outcome))
    }

    fn record_baseline(
        &mut self,
        granularity: Granularity,
        now: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) {
        self.windows.get_mut(granularity).boundary.record(now);
        info!("{} reset baseline recorded at {}", granularity, now.to_rfc3339());
        self.persist_window(granularity, outcome);
    }

    /// Freeze, persist the report, clear, then advance the reset timestamp
    fn close_window(
        &mut self,
        granularity: Granularity,
        closing_at: &DateTime<Tz>,
        now: DateTime<Utc>,
        reset_at: DateTime<Utc>,
        outcome: &mut CycleOutcome,
    ) -> ReportSnapshot {
        let window = self.windows.get_mut(granularity);
        let last = window.boundary.last_reset.map(|t| self.clock.local(&t));
        let period = ReportPeriod::closed_at(granularity, closing_at, last.as_ref());
        let report = freeze(&window.aggregate, period, now);

        if let Err(e) = self.store.save_report(&report, self.clock.tz()) {
            warn!("Failed to save {} report {}: {}", granularity, report.period.id, e);
            outcome.storage_errors += 1;
        }

        window.aggregate.clear();
        window.boundary.record(reset_at);
        window.last_report = Some(report.clone());

        info!(
            "{} window closed for {}: {} gangs, {} active, {} XP",
            granularity,
            report.period.id,
            report.summary.total_entities,
            report.summary.active_entities,
            report.summary.total_xp
        );

        self.persist_window(granularity, outcome);
        report
    }

    fn persist_snapshot(&self, outcome: &mut CycleOutcome) {
        let file = SnapshotFile {
            entities: self.entities.clone(),
            last_update: self.last_update,
        };
        if let Err(e) = self.store.save_snapshot(&file) {
            warn!("Failed to save gang snapshot: {}", e);
            outcome.storage_errors += 1;
        }
    }

    fn persist_window(&self, granularity: Granularity, outcome: &mut CycleOutcome) {
        if let Err(e) = self.store.save_window(&self.windows.get(granularity).to_file()) {
            warn!("Failed to save {} window: {}", granularity, e);
            outcome.storage_errors += 1;
        }
    }

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn clock(&self) -> &BoundaryClock {
        &self.clock
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    pub fn window(&self, granularity: Granularity) -> &WindowAggregate {
        &self.windows.get(granularity).aggregate
    }

    pub fn boundary(&self, granularity: Granularity) -> BoundaryState {
        self.windows.get(granularity).boundary
    }

    /// Most recent frozen report for a granularity
    pub fn last_report(&self, granularity: Granularity) -> Option<&ReportSnapshot> {
        self.windows.get(granularity).last_report.as_ref()
    }

    /// Window stats for one gang (zeroed if it has no entry)
    pub fn stats(&self, granularity: Granularity, name: &str) -> AggregateEntry {
        self.window(granularity).stats(name)
    }

    pub fn daily_stats(&self, name: &str) -> AggregateEntry {
        self.stats(Granularity::Daily, name)
    }

    pub fn weekly_stats(&self, name: &str) -> AggregateEntry {
        self.stats(Granularity::Weekly, name)
    }

    pub fn monthly_stats(&self, name: &str) -> AggregateEntry {
        self.stats(Granularity::Monthly, name)
    }

    /// Leaderboard joining the snapshot with all window totals
    pub fn standings(&self) -> Vec<Standing> {
        build_standings(
            &self.entities,
            &self.windows.daily.aggregate,
            &self.windows.weekly.aggregate,
            &self.windows.monthly.aggregate,
        )
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            entities: self.entities.len(),
            last_update: self.last_update,
            timezone: self.clock.tz().name().to_string(),
            windows: Granularity::ALL
                .iter()
                .map(|g| {
                    let window = self.windows.get(*g);
                    WindowStatus {
                        granularity: *g,
                        entries: window.aggregate.len(),
                        total_xp: window.aggregate.total_xp(),
                        last_reset: window.boundary.last_reset,
                        last_report_period: window
                            .last_report
                            .as_ref()
                            .map(|r| r.period.id.clone()),
                    }
                })
                .collect(),
        }
    }
}
