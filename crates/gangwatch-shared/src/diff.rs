//! Snapshot diffing - "what changed since the previous fetch".
//!
//! The first observation (empty previous snapshot) only establishes a
//! baseline and never reports anything. Entities that vanish from the
//! scoreboard produce no record; their aggregates simply stop moving.

use crate::entity::EntityRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-entity change between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub name: String,
    pub old_score: u64,
    pub new_score: u64,
    pub score_delta: i64,
    pub old_tier: u32,
    pub new_tier: u32,
    pub tier_delta: i64,
    pub old_rank: u32,
    pub new_rank: u32,
    pub rank_delta: i64,
    #[serde(default)]
    pub is_new: bool,
}

impl ChangeRecord {
    fn between(old: &EntityRecord, new: &EntityRecord) -> Self {
        Self {
            name: new.name.clone(),
            old_score: old.score,
            new_score: new.score,
            score_delta: new.score as i64 - old.score as i64,
            old_tier: old.tier,
            new_tier: new.tier,
            tier_delta: new.tier as i64 - old.tier as i64,
            old_rank: old.rank(),
            new_rank: new.rank(),
            rank_delta: new.rank() as i64 - old.rank() as i64,
            is_new: false,
        }
    }

    /// Entity with no prior record: deltas against a zero baseline, no rank move
    fn appeared(new: &EntityRecord) -> Self {
        Self {
            name: new.name.clone(),
            old_score: 0,
            new_score: new.score,
            score_delta: new.score as i64,
            old_tier: 0,
            new_tier: new.tier,
            tier_delta: new.tier as i64,
            old_rank: 0,
            new_rank: new.rank(),
            rank_delta: 0,
            is_new: true,
        }
    }

    /// Any field moved
    pub fn has_delta(&self) -> bool {
        self.score_delta != 0 || self.tier_delta != 0 || self.rank_delta != 0
    }

    /// Rank improved (smaller number is better)
    pub fn climbed(&self) -> bool {
        self.rank_delta < 0
    }

    /// Format as single line for logs
    pub fn format(&self) -> String {
        if self.is_new {
            return format!(
                "{} appeared at #{} with {} XP",
                self.name, self.new_rank, self.new_score
            );
        }
        format!(
            "{}: {} -> {} XP ({:+}), rank #{} -> #{} ({:+})",
            self.name,
            self.old_score,
            self.new_score,
            self.score_delta,
            self.old_rank,
            self.new_rank,
            self.rank_delta
        )
    }
}

/// Compare two snapshots. Output order follows `current`.
pub fn diff(previous: &[EntityRecord], current: &[EntityRecord]) -> Vec<ChangeRecord> {
    if previous.is_empty() {
        return Vec::new();
    }

    let by_name: HashMap<&str, &EntityRecord> =
        previous.iter().map(|r| (r.name.as_str(), r)).collect();

    current
        .iter()
        .filter_map(|curr| match by_name.get(curr.name.as_str()) {
            Some(prev) => {
                let change = ChangeRecord::between(prev, curr);
                change.has_delta().then_some(change)
            }
            None => Some(ChangeRecord::appeared(curr)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, score: u64, rank: u32) -> EntityRecord {
        EntityRecord::new(name, score, rank, rank)
    }

    #[test]
    fn test_empty_previous_is_silent() {
        let current = vec![rec("a", 10, 1), rec("b", 5, 2)];
        assert!(diff(&[], &current).is_empty());
    }

    #[test]
    fn test_unchanged_produces_nothing() {
        let snap = vec![rec("a", 10, 1)];
        assert!(diff(&snap, &snap).is_empty());
    }

    #[test]
    fn test_score_and_rank_delta() {
        let prev = vec![rec("a", 100, 2), rec("b", 150, 1)];
        let curr = vec![rec("a", 200, 1), rec("b", 150, 2)];

        let changes = diff(&prev, &curr);
        assert_eq!(changes.len(), 2);

        assert_eq!(changes[0].name, "a");
        assert_eq!(changes[0].score_delta, 100);
        assert_eq!(changes[0].rank_delta, -1);
        assert!(changes[0].climbed());

        assert_eq!(changes[1].name, "b");
        assert_eq!(changes[1].score_delta, 0);
        assert_eq!(changes[1].rank_delta, 1);
    }

    #[test]
    fn test_negative_delta_reported() {
        let prev = vec![rec("a", 100, 1)];
        let curr = vec![rec("a", 40, 1)];
        let changes = diff(&prev, &curr);
        assert_eq!(changes[0].score_delta, -60);
    }

    #[test]
    fn test_new_entity_zero_baseline() {
        let prev = vec![rec("a", 100, 1)];
        let curr = vec![rec("a", 100, 1), rec("fresh", 30, 2)];

        let changes = diff(&prev, &curr);
        assert_eq!(changes.len(), 1);
        let c = &changes[0];
        assert!(c.is_new);
        assert_eq!(c.old_score, 0);
        assert_eq!(c.score_delta, 30);
        assert_eq!(c.old_rank, 0);
        assert_eq!(c.rank_delta, 0);
    }

    #[test]
    fn test_disappeared_entity_is_ignored() {
        let prev = vec![rec("a", 100, 1), rec("gone", 50, 2)];
        let curr = vec![rec("a", 100, 1)];
        assert!(diff(&prev, &curr).is_empty());
    }
}
