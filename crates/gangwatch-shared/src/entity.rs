//! Scoreboard entities and canonical ranking.
//!
//! A snapshot is the full list of entities returned by one scoreboard fetch.
//! Snapshots are superseded wholesale; nothing in here is mutated after a
//! cycle has produced it.

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One scoreboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Unique key (gang name, exact match)
    pub name: String,
    /// Cumulative XP
    pub score: u64,
    /// Source level before ranking; original source position after ranking
    pub tier: u32,
    /// Source rank before ranking; canonical 1-based rank after ranking
    pub position_hint: u32,
}

impl EntityRecord {
    pub fn new(name: &str, score: u64, tier: u32, position_hint: u32) -> Self {
        Self {
            name: name.to_string(),
            score,
            tier,
            position_hint,
        }
    }

    /// Canonical rank (valid once the snapshot went through [`rerank`])
    pub fn rank(&self) -> u32 {
        self.position_hint
    }
}

/// Reject snapshots the engine cannot key reliably.
///
/// An empty list, empty names and duplicate names are hard failures; a
/// partial snapshot is never accepted.
pub fn validate_snapshot(records: &[EntityRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(TrackerError::MalformedPayload(
            "snapshot contains no entities".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        if record.name.trim().is_empty() {
            return Err(TrackerError::MalformedPayload(format!(
                "record {} has an empty name",
                idx
            )));
        }
        if !seen.insert(record.name.as_str()) {
            return Err(TrackerError::MalformedPayload(format!(
                "duplicate entity name '{}'",
                record.name
            )));
        }
    }
    Ok(())
}

/// Sort by score descending and assign canonical 1-based ranks.
///
/// Ties keep the incoming order (stable sort). The source's own position is
/// kept in `tier` for audit; the canonical rank lands in `position_hint`.
pub fn rerank(records: Vec<EntityRecord>) -> Vec<EntityRecord> {
    let mut ranked = records;
    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    for (idx, record) in ranked.iter_mut().enumerate() {
        record.tier = record.position_hint;
        record.position_hint = idx as u32 + 1;
    }

    ranked
}

/// Find an entity by exact name
pub fn find<'a>(records: &'a [EntityRecord], name: &str) -> Option<&'a EntityRecord> {
    records.iter().find(|r| r.name == name)
}
