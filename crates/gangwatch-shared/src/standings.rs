//! Leaderboard view and change filters.

use crate::diff::ChangeRecord;
use crate::entity::EntityRecord;
use crate::window::WindowAggregate;
use serde::{Deserialize, Serialize};

/// Default minimum |XP delta| considered worth surfacing
pub const DEFAULT_SIGNIFICANT_XP: u64 = 500;

/// One leaderboard row: current snapshot joined with window totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub name: String,
    pub rank: u32,
    pub score: u64,
    pub source_position: u32,
    pub daily_xp: u64,
    pub weekly_xp: u64,
    pub monthly_xp: u64,
    pub task1_completed: bool,
    pub task2_completed: bool,
    pub task1_xp: u64,
    pub task2_xp: u64,
}

/// Join every entity with its window totals; missing entries read as zero
pub fn build_standings(
    entities: &[EntityRecord],
    daily: &WindowAggregate,
    weekly: &WindowAggregate,
    monthly: &WindowAggregate,
) -> Vec<Standing> {
    entities
        .iter()
        .map(|entity| {
            let day = daily.stats(&entity.name);
            let tasks = day.tasks.clone().unwrap_or_default();
            Standing {
                name: entity.name.clone(),
                rank: entity.rank(),
                score: entity.score,
                source_position: entity.tier,
                daily_xp: day.total_xp,
                weekly_xp: weekly.stats(&entity.name).total_xp,
                monthly_xp: monthly.stats(&entity.name).total_xp,
                task1_completed: tasks.task1_completed,
                task2_completed: tasks.task2_completed,
                task1_xp: tasks.task1_xp,
                task2_xp: tasks.task2_xp,
            }
        })
        .collect()
}

/// Changes whose XP moved by at least `threshold` in either direction
pub fn significant_changes(changes: &[ChangeRecord], threshold: u64) -> Vec<&ChangeRecord> {
    changes
        .iter()
        .filter(|c| c.score_delta.unsigned_abs() >= threshold)
        .collect()
}

/// Changes where the canonical rank moved
pub fn rank_changes(changes: &[ChangeRecord]) -> Vec<&ChangeRecord> {
    changes.iter().filter(|c| c.rank_delta != 0).collect()
}
