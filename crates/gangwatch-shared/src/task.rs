//! Daily task detection.
//!
//! The scoreboard has no notion of tasks; a completed task shows up as a
//! score jump of one exact reward amount. Detection is therefore a heuristic:
//! a reward granted together with unrelated XP in the same fetch interval,
//! or a reward whose amount changes upstream, is not classified. The
//! detector sits behind a trait so the rule can be swapped without touching
//! accumulation.

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Default reward granted for a completed task
pub const DEFAULT_TASK_REWARD: u64 = 500;

/// Daytime slot start hour (inclusive)
pub const DEFAULT_DAY_START_HOUR: u32 = 7;

/// Daytime slot end hour (exclusive)
pub const DEFAULT_DAY_END_HOUR: u32 = 18;

/// The two daily task slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSlot {
    /// Daytime task
    Task1,
    /// Evening/night task
    Task2,
}

/// Classifies a positive score delta observed at a local instant
pub trait TaskDetector: Send + Sync {
    /// Return the slot this delta completes, if it looks like a task reward
    fn classify(&self, score_delta: i64, observed_at: &DateTime<Tz>) -> Option<TaskSlot>;
}

/// Exact-amount detector: a delta equal to the reward is a task; the local
/// hour picks the slot (`[day_start, day_end)` is task 1, the rest task 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactRewardDetector {
    pub reward: u64,
    pub day_start_hour: u32,
    pub day_end_hour: u32,
}

impl Default for ExactRewardDetector {
    fn default() -> Self {
        Self {
            reward: DEFAULT_TASK_REWARD,
            day_start_hour: DEFAULT_DAY_START_HOUR,
            day_end_hour: DEFAULT_DAY_END_HOUR,
        }
    }
}

impl ExactRewardDetector {
    pub fn new(reward: u64) -> Self {
        Self {
            reward,
            ..Default::default()
        }
    }

    /// Slot for a local hour regardless of the delta
    pub fn slot_for_hour(&self, hour: u32) -> TaskSlot {
        if hour >= self.day_start_hour && hour < self.day_end_hour {
            TaskSlot::Task1
        } else {
            TaskSlot::Task2
        }
    }
}

impl TaskDetector for ExactRewardDetector {
    fn classify(&self, score_delta: i64, observed_at: &DateTime<Tz>) -> Option<TaskSlot> {
        if score_delta <= 0 || score_delta as u64 != self.reward {
            return None;
        }
        Some(self.slot_for_hour(observed_at.hour()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Tehran;

    fn at(hour: u32) -> DateTime<Tz> {
        Tehran.with_ymd_and_hms(2026, 3, 10, hour, 15, 0).single().unwrap()
    }

    #[test]
    fn test_exact_reward_daytime() {
        let d = ExactRewardDetector::default();
        assert_eq!(d.classify(500, &at(7)), Some(TaskSlot::Task1));
        assert_eq!(d.classify(500, &at(17)), Some(TaskSlot::Task1));
    }

    #[test]
    fn test_exact_reward_evening_and_night() {
        let d = ExactRewardDetector::default();
        assert_eq!(d.classify(500, &at(18)), Some(TaskSlot::Task2));
        assert_eq!(d.classify(500, &at(23)), Some(TaskSlot::Task2));
        assert_eq!(d.classify(500, &at(3)), Some(TaskSlot::Task2));
        assert_eq!(d.classify(500, &at(6)), Some(TaskSlot::Task2));
    }

    #[test]
    fn test_other_amounts_ignored() {
        let d = ExactRewardDetector::default();
        assert_eq!(d.classify(499, &at(10)), None);
        assert_eq!(d.classify(1000, &at(10)), None);
        assert_eq!(d.classify(-500, &at(10)), None);
    }

    #[test]
    fn test_custom_reward() {
        let d = ExactRewardDetector::new(750);
        assert_eq!(d.classify(500, &at(10)), None);
        assert_eq!(d.classify(750, &at(10)), Some(TaskSlot::Task1));
    }
}
