//! Engine tests: diff -> aggregate -> boundary -> freeze.
//!
//! Tests verify:
//! - Window totals equal the sum of positive deltas, in every granularity
//! - Boundary predicates fire exactly at the local reset instants
//! - Frozen reports are unaffected by later window mutations
//! - Report periods and ids follow the closing instant

use chrono::{DateTime, TimeZone, Weekday};
use chrono_tz::Asia::Tehran;
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;
use gangwatch_shared::{
    diff, freeze, rerank, BoundaryClock, EntityRecord, ExactRewardDetector, Granularity,
    ReportPeriod, ReportSnapshot, WindowAggregate,
};

fn tehran(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
    Tehran.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
}

fn snapshot(rows: &[(&str, u64)]) -> Vec<EntityRecord> {
    let records = rows
        .iter()
        .enumerate()
        .map(|(idx, (name, xp))| EntityRecord::new(name, *xp, 1, idx as u32 + 1))
        .collect();
    rerank(records)
}

#[test]
fn test_window_totals_equal_positive_delta_sum() {
    let detector = ExactRewardDetector::default();
    let mut windows: Vec<WindowAggregate> = Granularity::ALL
        .iter()
        .map(|g| WindowAggregate::new(*g))
        .collect();

    let snapshots = vec![
        snapshot(&[("Vipers", 1000), ("Ravens", 800), ("Wolves", 300)]),
        snapshot(&[("Vipers", 1500), ("Ravens", 800), ("Wolves", 350)]),
        // Ravens loses XP: ignored by the aggregate
        snapshot(&[("Vipers", 1500), ("Ravens", 700), ("Wolves", 900)]),
        snapshot(&[("Vipers", 2100), ("Ravens", 750), ("Wolves", 900), ("Sharks", 40)]),
    ];

    let mut expected_positive: i64 = 0;
    let now = tehran(2026, 3, 10, 12, 0);
    for pair in snapshots.windows(2) {
        let changes = diff(&pair[0], &pair[1]);
        expected_positive += changes
            .iter()
            .filter(|c| c.score_delta > 0)
            .map(|c| c.score_delta)
            .sum::<i64>();
        for window in windows.iter_mut() {
            window.apply(&changes, &now, &detector);
        }
    }

    // 500 + 50 + 550 + 600 + 50 + 40
    assert_eq!(expected_positive, 1790);
    for window in &windows {
        assert_eq!(window.total_xp(), 1790, "{} window", window.granularity);
    }
    assert_eq!(windows[0].stats("Vipers").total_xp, 1100);
    assert_eq!(windows[0].stats("Ravens").total_xp, 50);
    assert_eq!(windows[0].stats("Sharks").total_xp, 40);
}

#[test]
fn test_tasks_only_tracked_daily() {
    let detector = ExactRewardDetector::default();
    let mut daily = WindowAggregate::new(Granularity::Daily);
    let mut weekly = WindowAggregate::new(Granularity::Weekly);

    let before = snapshot(&[("Vipers", 1000)]);
    let after = snapshot(&[("Vipers", 1500)]);
    let changes = diff(&before, &after);
    let at = tehran(2026, 3, 10, 10, 0);
    daily.apply(&changes, &at, &detector);
    weekly.apply(&changes, &at, &detector);

    assert!(daily.stats("Vipers").task1_completed());
    assert!(weekly.stats("Vipers").tasks.is_none());
    assert_eq!(weekly.stats("Vipers").total_xp, 500);
}

#[test]
fn test_daily_boundary_exact_instant() {
    let clock = BoundaryClock::new(Tehran);
    let last = tehran(2026, 3, 1, 7, 0);

    assert!(clock.should_reset(Granularity::Daily, &tehran(2026, 3, 2, 7, 0), Some(&last)));
    assert!(!clock.should_reset(Granularity::Daily, &tehran(2026, 3, 2, 6, 59), Some(&last)));
    assert!(!clock.should_reset(Granularity::Daily, &tehran(2026, 3, 2, 7, 1), Some(&last)));
    // Same date as last reset
    assert!(!clock.should_reset(Granularity::Daily, &tehran(2026, 3, 1, 7, 0), Some(&last)));
    assert!(!clock.should_reset(Granularity::Daily, &tehran(2026, 3, 2, 7, 0), None));
}

#[test]
fn test_weekly_boundary_needs_seven_days() {
    let clock = BoundaryClock::new(Tehran);
    let monday = tehran(2026, 3, 2, 7, 0);
    assert_eq!(clock.reset_weekday(), Weekday::Mon);

    let previous_monday = tehran(2026, 2, 23, 7, 0);
    assert!(clock.should_reset(Granularity::Weekly, &monday, Some(&previous_monday)));

    let wednesday = tehran(2026, 2, 25, 9, 0);
    assert!(!clock.should_reset(Granularity::Weekly, &monday, Some(&wednesday)));

    let tuesday = tehran(2026, 3, 3, 7, 0);
    assert!(!clock.should_reset(Granularity::Weekly, &tuesday, Some(&previous_monday)));
}

#[test]
fn test_monthly_boundary_first_of_month() {
    let clock = BoundaryClock::new(Tehran);
    let last = tehran(2026, 3, 1, 7, 0);

    assert!(clock.should_reset(Granularity::Monthly, &tehran(2026, 4, 1, 7, 0), Some(&last)));
    assert!(!clock.should_reset(Granularity::Monthly, &tehran(2026, 4, 2, 7, 0), Some(&last)));
    assert!(!clock.should_reset(Granularity::Monthly, &tehran(2026, 3, 1, 7, 0), Some(&last)));
}

#[test]
fn test_missed_boundaries_detected() {
    let clock = BoundaryClock::new(Tehran);
    let now = tehran(2026, 3, 3, 10, 0);

    let stale = tehran(2026, 2, 23, 7, 0);
    assert!(clock.missed_boundary(Granularity::Daily, &now, Some(&stale)));
    assert!(clock.missed_boundary(Granularity::Weekly, &now, Some(&stale)));
    assert!(clock.missed_boundary(Granularity::Monthly, &now, Some(&stale)));

    let fresh = tehran(2026, 3, 3, 7, 0);
    assert!(!clock.missed_boundary(Granularity::Daily, &now, Some(&fresh)));
    assert!(!clock.missed_boundary(Granularity::Weekly, &now, Some(&fresh)));
    assert!(!clock.missed_boundary(Granularity::Daily, &now, None));
}

#[test]
fn test_next_boundary_rolls_over_dst_gap() {
    // Berlin springs forward at 02:00 on 2026-03-29
    let clock = BoundaryClock::new(Berlin).with_reset_hour(2);
    let now = Berlin.with_ymd_and_hms(2026, 3, 28, 12, 0, 0).single().unwrap();

    let next = clock.next_daily_boundary(&now).unwrap();
    assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2026-03-29 03:00");
}

#[test]
fn test_report_periods() {
    let last = tehran(2026, 2, 23, 7, 0);

    let closing = tehran(2026, 3, 2, 7, 0);
    let daily = ReportPeriod::closed_at(Granularity::Daily, &closing, Some(&last));
    assert_eq!(daily.id, "2026-03-01");

    let weekly = ReportPeriod::closed_at(Granularity::Weekly, &closing, Some(&last));
    assert_eq!(weekly.id, "2026-02-23_2026-03-01");
    assert_eq!(weekly.days(), 7);

    let monthly = ReportPeriod::closed_at(
        Granularity::Monthly,
        &tehran(2026, 4, 1, 7, 0),
        Some(&tehran(2026, 3, 1, 7, 0)),
    );
    assert_eq!(monthly.id, "2026-03");
    assert_eq!(monthly.days(), 31);
}

#[test]
fn test_frozen_report_survives_clear() {
    let detector = ExactRewardDetector::default();
    let mut daily = WindowAggregate::new(Granularity::Daily);
    let before = snapshot(&[("Vipers", 1000), ("Ravens", 500)]);
    let after = snapshot(&[("Vipers", 1500), ("Ravens", 620)]);
    daily.apply(&diff(&before, &after), &tehran(2026, 3, 1, 20, 0), &detector);

    let closing = tehran(2026, 3, 2, 7, 0);
    let last = tehran(2026, 3, 1, 7, 0);
    let period = ReportPeriod::closed_at(Granularity::Daily, &closing, Some(&last));
    let report = freeze(&daily, period, closing.with_timezone(&chrono::Utc));
    let copy = report.clone();

    daily.clear();
    assert!(daily.is_empty());
    assert_eq!(report, copy);
    assert_eq!(report.summary.total_xp, 620);
    assert_eq!(report.summary.active_entities, 2);

    let tasks = report.summary.tasks.as_ref().unwrap();
    assert_eq!(tasks.task1_completed, 0);
    assert_eq!(tasks.task2_completed, 1);

    let json = serde_json::to_string(&report).unwrap();
    let restored: ReportSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, report);
}

#[test]
fn test_rendered_report_ranks_by_xp() {
    let detector = ExactRewardDetector::default();
    let mut weekly = WindowAggregate::new(Granularity::Weekly);
    let before = snapshot(&[("Vipers", 10_000), ("Ravens", 5_000)]);
    let after = snapshot(&[("Vipers", 10_100), ("Ravens", 6_300)]);
    weekly.apply(&diff(&before, &after), &tehran(2026, 3, 1, 20, 0), &detector);

    let closing = tehran(2026, 3, 2, 7, 0);
    let last = tehran(2026, 2, 23, 7, 0);
    let period = ReportPeriod::closed_at(Granularity::Weekly, &closing, Some(&last));
    let text = freeze(&weekly, period, closing.with_timezone(&chrono::Utc)).render_text(Tehran);

    assert!(text.starts_with("GANG WEEKLY REPORT\n"));
    let ravens = text.find("1. Ravens: 1,300 XP").unwrap();
    let vipers = text.find("2. Vipers: 100 XP").unwrap();
    assert!(ravens < vipers);
    assert!(!text.contains("Tasks:"));
}
