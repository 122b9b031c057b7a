//! Window reports - frozen copies of an aggregate at closure time.
//!
//! A report is built strictly before the live window is cleared and owns a
//! deep copy of the entries, so it stays stable after the reset.

use crate::window::{AggregateEntry, Granularity, WindowAggregate};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Task completion counts (daily reports only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task1_completed: usize,
    pub task2_completed: usize,
    pub both_completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_entities: usize,
    pub active_entities: usize,
    pub total_xp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskSummary>,
}

impl ReportSummary {
    /// Full-scan reduction over the frozen entries
    pub fn from_entries(granularity: Granularity, entries: &[AggregateEntry]) -> Self {
        let tasks = granularity.tracks_tasks().then(|| TaskSummary {
            task1_completed: entries.iter().filter(|e| e.task1_completed()).count(),
            task2_completed: entries.iter().filter(|e| e.task2_completed()).count(),
            both_completed: entries
                .iter()
                .filter(|e| e.task1_completed() && e.task2_completed())
                .count(),
        });

        Self {
            total_entities: entries.len(),
            active_entities: entries.iter().filter(|e| e.is_active()).count(),
            total_xp: entries.iter().map(|e| e.total_xp).sum(),
            tasks,
        }
    }
}

/// Calendar span a report covers, plus its storage key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// `2026-03-01` (daily), `2026-02-23_2026-03-01` (weekly), `2026-02` (monthly)
    pub id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// Period closed by a reset at `closing_at`.
    ///
    /// The window ends on the local day before the closing instant and
    /// starts on the local date of the previous reset.
    pub fn closed_at(
        granularity: Granularity,
        closing_at: &DateTime<Tz>,
        last_reset: Option<&DateTime<Tz>>,
    ) -> Self {
        let closing_date = closing_at.date_naive();
        let end = closing_date.pred_opt().unwrap_or(closing_date);
        let start = last_reset
            .map(|t| t.date_naive())
            .filter(|d| *d <= end)
            .unwrap_or(end);

        let id = match granularity {
            Granularity::Daily => end.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => {
                format!("{}_{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
            }
            Granularity::Monthly => end.format("%Y-%m").to_string(),
        };

        Self { id, start, end }
    }

    /// Number of local days covered
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Immutable summary of a closed window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub granularity: Granularity,
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<AggregateEntry>,
    pub summary: ReportSummary,
}

/// Freeze the live window into a report. Must run before the window is cleared.
pub fn freeze(
    window: &WindowAggregate,
    period: ReportPeriod,
    generated_at: DateTime<Utc>,
) -> ReportSnapshot {
    let entries = window.entries.clone();
    let summary = ReportSummary::from_entries(window.granularity, &entries);

    ReportSnapshot {
        granularity: window.granularity,
        period,
        generated_at,
        entries,
        summary,
    }
}

impl ReportSnapshot {
    /// File stem used by storage: `daily-report-2026-03-01`
    pub fn file_stem(&self) -> String {
        format!("{}-report-{}", self.granularity, self.period.id)
    }

    /// Entries sorted by XP gained, highest first (ties keep window order)
    pub fn ranking(&self) -> Vec<&AggregateEntry> {
        let mut ranked: Vec<&AggregateEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.total_xp.cmp(&a.total_xp));
        ranked
    }

    /// Human-readable rendering stored next to the JSON record
    pub fn render_text(&self, tz: Tz) -> String {
        let title = match self.granularity {
            Granularity::Daily => "DAILY",
            Granularity::Weekly => "WEEKLY",
            Granularity::Monthly => "MONTHLY",
        };
        let rule = "=".repeat(50);
        let mut out = String::new();

        out.push_str(&format!("GANG {} REPORT\n", title));
        out.push_str(&format!("Period: {}\n", self.period.id));
        if self.period.days() > 1 {
            out.push_str(&format!(
                "Covers: {} .. {} ({} days)\n",
                self.period.start, self.period.end, self.period.days()
            ));
        }
        out.push_str(&format!(
            "Generated: {}\n",
            self.generated_at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z")
        ));
        out.push_str(&format!("\n{}\n\n", rule));

        out.push_str("SUMMARY:\n");
        out.push_str(&format!("  Total gangs:  {}\n", self.summary.total_entities));
        out.push_str(&format!("  Active gangs: {}\n", self.summary.active_entities));
        out.push_str(&format!("  Total XP:     {}\n", format_xp(self.summary.total_xp)));
        if let Some(tasks) = &self.summary.tasks {
            out.push_str(&format!("  Task 1 done:  {}\n", tasks.task1_completed));
            out.push_str(&format!("  Task 2 done:  {}\n", tasks.task2_completed));
            out.push_str(&format!("  Both done:    {}\n", tasks.both_completed));
        }

        out.push_str(&format!("\n{} XP RANKING:\n", title));
        for (idx, entry) in self.ranking().iter().enumerate() {
            out.push_str(&format!(
                "{:>3}. {}: {} XP\n",
                idx + 1,
                entry.name,
                format_xp(entry.total_xp)
            ));
            if let Some(tasks) = &entry.tasks {
                out.push_str(&format!(
                    "     Tasks: [{}] [{}] | Task1: {} | Task2: {}\n",
                    mark(tasks.task1_completed),
                    mark(tasks.task2_completed),
                    tasks.task1_xp,
                    tasks.task2_xp
                ));
            }
        }

        out.push_str(&format!("\n{}\n", rule));
        out
    }
}

fn mark(done: bool) -> char {
    if done {
        'x'
    } else {
        ' '
    }
}

/// `1234567` -> `1,234,567`
pub fn format_xp(xp: u64) -> String {
    let digits = xp.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
