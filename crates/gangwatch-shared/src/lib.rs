//! Shared engine for gangwatch: snapshot diffing, windowed XP aggregation,
//! timezone-exact window boundaries and frozen window reports.
//!
//! Everything in this crate is pure; fetching, persistence and scheduling
//! live in the daemon.

pub mod boundary;
pub mod diff;
pub mod entity;
pub mod error;
pub mod report;
pub mod standings;
pub mod task;
pub mod window;

pub use boundary::{BoundaryClock, BoundaryState};
pub use diff::{diff, ChangeRecord};
pub use entity::{rerank, validate_snapshot, EntityRecord};
pub use error::TrackerError;
pub use report::{freeze, ReportPeriod, ReportSnapshot, ReportSummary};
pub use task::{ExactRewardDetector, TaskDetector, TaskSlot};
pub use window::{AggregateEntry, Granularity, TaskProgress, WindowAggregate};

/// Single source of truth for version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
