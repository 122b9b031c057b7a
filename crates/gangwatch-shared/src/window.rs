//! Windowed XP aggregation (daily, weekly, monthly).
//!
//! Totals are monotonic "XP gained" counters, not mirrors of the absolute
//! score: only positive deltas are applied. Only the daily window tracks
//! task slots.

use crate::diff::ChangeRecord;
use crate::entity::EntityRecord;
use crate::error::TrackerError;
use crate::task::{TaskDetector, TaskSlot};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Window cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }

    /// Whether this window classifies task slots
    pub fn tracks_tasks(&self) -> bool {
        matches!(self, Granularity::Daily)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Granularity::Daily),
            "weekly" | "week" => Ok(Granularity::Weekly),
            "monthly" | "month" => Ok(Granularity::Monthly),
            other => Err(TrackerError::UnknownGranularity(other.to_string())),
        }
    }
}

/// Task slot progress for one entity in the current day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task1_completed: bool,
    pub task2_completed: bool,
    pub task1_xp: u64,
    pub task2_xp: u64,
}

impl TaskProgress {
    /// Mark a slot completed. Returns false if it already was.
    pub fn complete(&mut self, slot: TaskSlot, amount: u64) -> bool {
        let (done, xp) = match slot {
            TaskSlot::Task1 => (&mut self.task1_completed, &mut self.task1_xp),
            TaskSlot::Task2 => (&mut self.task2_completed, &mut self.task2_xp),
        };
        if *done {
            return false;
        }
        *done = true;
        *xp = amount;
        true
    }

    pub fn both_completed(&self) -> bool {
        self.task1_completed && self.task2_completed
    }
}

/// Running total for one entity within one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub name: String,
    pub total_xp: u64,
    /// Present for daily windows only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskProgress>,
}

impl AggregateEntry {
    pub fn new(name: &str, granularity: Granularity) -> Self {
        Self {
            name: name.to_string(),
            total_xp: 0,
            tasks: granularity.tracks_tasks().then(TaskProgress::default),
        }
    }

    pub fn is_active(&self) -> bool {
        self.total_xp > 0
    }

    pub fn task1_completed(&self) -> bool {
        self.tasks.as_ref().map_or(false, |t| t.task1_completed)
    }

    pub fn task2_completed(&self) -> bool {
        self.tasks.as_ref().map_or(false, |t| t.task2_completed)
    }
}

/// Live aggregate for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub granularity: Granularity,
    pub entries: Vec<AggregateEntry>,
}

impl WindowAggregate {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(granularity: Granularity, entries: Vec<AggregateEntry>) -> Self {
        Self {
            granularity,
            entries,
        }
    }

    pub fn entry(&self, name: &str) -> Option<&AggregateEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn entry_mut(&mut self, name: &str) -> &mut AggregateEntry {
        let idx = match self.entries.iter().position(|e| e.name == name) {
            Some(idx) => idx,
            None => {
                self.entries.push(AggregateEntry::new(name, self.granularity));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx]
    }

    /// Stats for an entity, zeroed when it has no entry in this window
    pub fn stats(&self, name: &str) -> AggregateEntry {
        self.entry(name)
            .cloned()
            .unwrap_or_else(|| AggregateEntry::new(name, self.granularity))
    }

    /// Zero entry for every entity not yet present (first-ever cycle)
    pub fn seed(&mut self, records: &[EntityRecord]) {
        for record in records {
            self.entry_mut(&record.name);
        }
    }

    /// Accumulate positive deltas observed at `now_local`.
    ///
    /// The detector is only consulted for windows that track tasks. A slot
    /// completes once per window; later qualifying deltas still count
    /// towards the total.
    pub fn apply(
        &mut self,
        changes: &[ChangeRecord],
        now_local: &DateTime<Tz>,
        detector: &dyn TaskDetector,
    ) {
        let tracks_tasks = self.granularity.tracks_tasks();

        for change in changes.iter().filter(|c| c.score_delta > 0) {
            let gained = change.score_delta as u64;
            let entry = self.entry_mut(&change.name);
            entry.total_xp += gained;

            if !tracks_tasks {
                continue;
            }
            if let Some(slot) = detector.classify(change.score_delta, now_local) {
                entry
                    .tasks
                    .get_or_insert_with(TaskProgress::default)
                    .complete(slot, gained);
            }
        }
    }

    /// Drop every entry; the window starts over as the empty set
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_xp(&self) -> u64 {
        self.entries.iter().map(|e| e.total_xp).sum()
    }
}
