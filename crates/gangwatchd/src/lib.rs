//! Gangwatch daemon library - exposes modules for testing.

pub mod config;
pub mod fetcher;
pub mod monitor;
pub mod store;
pub mod tracker;

pub use config::Config;
pub use fetcher::{HttpSource, SnapshotSource};
pub use monitor::{Monitor, SharedTracker, TrackerEvent};
pub use store::JsonStore;
pub use tracker::{CycleOutcome, Tracker, TrackerStatus};
