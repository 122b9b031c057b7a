//! Boundary clock - decides when a window closes.
//!
//! All rules are evaluated in the scoreboard's home timezone (a named IANA
//! zone, never a fixed offset). Predicates are pure: the caller records the
//! new reset timestamp only after the reset side effects completed, which is
//! what makes repeated calls inside the same boundary minute return false.

use crate::error::{Result, TrackerError};
use crate::window::Granularity;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Local hour at which every window rolls over
pub const DEFAULT_RESET_HOUR: u32 = 7;

/// Weekday on which the weekly window rolls over
pub const DEFAULT_RESET_WEEKDAY: Weekday = Weekday::Mon;

/// Scoreboard home zone
pub const DEFAULT_TIMEZONE: &str = "Asia/Tehran";

/// Minimum elapsed days between two weekly resets
const WEEKLY_MIN_DAYS: i64 = 7;

/// Last reset for one granularity. `None` means never initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryState {
    pub last_reset: Option<DateTime<Utc>>,
}

impl BoundaryState {
    pub fn at(last_reset: DateTime<Utc>) -> Self {
        Self {
            last_reset: Some(last_reset),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.last_reset.is_some()
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_reset = Some(now);
    }
}

/// Timezone-aware reset rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryClock {
    tz: Tz,
    reset_hour: u32,
    reset_weekday: Weekday,
}

impl Default for BoundaryClock {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Tehran)
    }
}

impl BoundaryClock {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            reset_hour: DEFAULT_RESET_HOUR,
            reset_weekday: DEFAULT_RESET_WEEKDAY,
        }
    }

    /// Build from an IANA zone name such as `Asia/Tehran`
    pub fn from_zone_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| TrackerError::UnknownTimezone(name.to_string()))?;
        Ok(Self::new(tz))
    }

    pub fn with_reset_hour(mut self, hour: u32) -> Self {
        self.reset_hour = hour.min(23);
        self
    }

    pub fn with_reset_weekday(mut self, weekday: Weekday) -> Self {
        self.reset_weekday = weekday;
        self
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn reset_hour(&self) -> u32 {
        self.reset_hour
    }

    pub fn reset_weekday(&self) -> Weekday {
        self.reset_weekday
    }

    /// Convert an absolute instant to the scoreboard's local time
    pub fn local(&self, instant: &DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    /// Local view of a stored boundary state
    pub fn local_last_reset(&self, state: &BoundaryState) -> Option<DateTime<Tz>> {
        state.last_reset.map(|t| self.local(&t))
    }

    /// Whether the window for `granularity` has just closed.
    ///
    /// Always false for an uninitialized state; the caller records `now` as
    /// the baseline instead. "At the reset hour" means within the first
    /// minute after the local boundary instant, so a reset hour swallowed by
    /// a DST gap fires at the end of the gap.
    pub fn should_reset(
        &self,
        granularity: Granularity,
        now: &DateTime<Tz>,
        last_reset: Option<&DateTime<Tz>>,
    ) -> bool {
        let Some(last) = last_reset else {
            return false;
        };
        if !self.in_boundary_minute(now) {
            return false;
        }

        match granularity {
            Granularity::Daily => now.date_naive() != last.date_naive(),
            Granularity::Weekly => {
                now.weekday() == self.reset_weekday
                    && now.signed_duration_since(*last) >= Duration::days(WEEKLY_MIN_DAYS)
            }
            Granularity::Monthly => {
                now.day() == 1 && (now.year(), now.month()) != (last.year(), last.month())
            }
        }
    }

    /// Manual daily reset: ignores the time of day but never fires twice on
    /// the same local date, and never on an uninitialized state.
    pub fn should_force_daily(
        &self,
        now: &DateTime<Tz>,
        last_reset: Option<&DateTime<Tz>>,
    ) -> bool {
        match last_reset {
            Some(last) => now.date_naive() != last.date_naive(),
            None => false,
        }
    }

    /// Most recent boundary instant at or before `now`
    pub fn last_boundary(
        &self,
        granularity: Granularity,
        now: &DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        let today = now.date_naive();
        let candidate_date = match granularity {
            Granularity::Daily => today,
            Granularity::Weekly => {
                let back = (today.weekday().num_days_from_monday() + 7
                    - self.reset_weekday.num_days_from_monday())
                    % 7;
                today - Duration::days(back as i64)
            }
            Granularity::Monthly => today.with_day(1)?,
        };

        let candidate = self.at_reset_hour(candidate_date)?;
        if candidate <= *now {
            return Some(candidate);
        }

        let earlier = match granularity {
            Granularity::Daily => candidate_date.pred_opt()?,
            Granularity::Weekly => candidate_date - Duration::days(7),
            Granularity::Monthly => first_of_previous_month(candidate_date)?,
        };
        self.at_reset_hour(earlier)
    }

    /// The boundary instant that passed unobserved, if any.
    ///
    /// Set when the most recent boundary lies after `last_reset` and the
    /// regular rule would have fired at that boundary instant.
    pub fn overdue_boundary(
        &self,
        granularity: Granularity,
        now: &DateTime<Tz>,
        last_reset: Option<&DateTime<Tz>>,
    ) -> Option<DateTime<Tz>> {
        let last = last_reset?;
        let boundary = self.last_boundary(granularity, now)?;
        (boundary > *last && self.should_reset(granularity, &boundary, Some(last)))
            .then_some(boundary)
    }

    /// A boundary passed while nobody was checking
    pub fn missed_boundary(
        &self,
        granularity: Granularity,
        now: &DateTime<Tz>,
        last_reset: Option<&DateTime<Tz>>,
    ) -> bool {
        self.overdue_boundary(granularity, now, last_reset).is_some()
    }

    /// Next daily boundary strictly after `now`
    pub fn next_daily_boundary(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let today = now.date_naive();
        match self.at_reset_hour(today) {
            Some(candidate) if candidate > *now => Some(candidate),
            _ => self.at_reset_hour(today.succ_opt()?),
        }
    }

    fn in_boundary_minute(&self, now: &DateTime<Tz>) -> bool {
        match self.at_reset_hour(now.date_naive()) {
            Some(boundary) => *now >= boundary && *now < boundary + Duration::minutes(1),
            None => false,
        }
    }

    fn at_reset_hour(&self, date: NaiveDate) -> Option<DateTime<Tz>> {
        let naive = date.and_hms_opt(self.reset_hour, 0, 0)?;
        // A DST gap can swallow the reset hour; roll forward into the gap's end
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
    }
}

fn first_of_previous_month(first: NaiveDate) -> Option<NaiveDate> {
    first.pred_opt()?.with_day(1)
}
