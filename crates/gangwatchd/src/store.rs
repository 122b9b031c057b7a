//! Durable JSON state for gangwatchd.
//!
//! Layout under the data directory:
//! - `gangs.json`       last snapshot + last update time
//! - `daily_xp.json`    daily window entries, last reset, last report
//! - `weekly_xp.json`   same for the weekly window
//! - `monthly_xp.json`  same for the monthly window
//! - `reports/`         `<granularity>-report-<period>.json` and `.txt`
//!
//! Every write goes to a temp file first and is renamed into place. A file
//! that fails to parse is moved aside to `*.corrupt` and treated as absent.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gangwatch_shared::{AggregateEntry, EntityRecord, Granularity, ReportSnapshot, TrackerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, TrackerError>;

/// Snapshot file name
const GANGS_FILENAME: &str = "gangs.json";

/// Report directory name
const REPORTS_DIRNAME: &str = "reports";

/// Persisted previous snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

/// Persisted window state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFile {
    pub granularity: Granularity,
    #[serde(default)]
    pub entries: Vec<AggregateEntry>,
    #[serde(default)]
    pub last_reset: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_report: Option<ReportSnapshot>,
}

impl WindowFile {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            entries: Vec::new(),
            last_reset: None,
            last_report: None,
        }
    }
}

/// JSON file store rooted at the data directory
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(GANGS_FILENAME)
    }

    pub fn window_path(&self, granularity: Granularity) -> PathBuf {
        self.root.join(format!("{}_xp.json", granularity))
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIRNAME)
    }

    pub fn load_snapshot(&self) -> Result<SnapshotFile> {
        Ok(self.read_json(&self.snapshot_path())?.unwrap_or_default())
    }

    pub fn save_snapshot(&self, snapshot: &SnapshotFile) -> Result<()> {
        self.write_json(&self.snapshot_path(), snapshot)
    }

    pub fn load_window(&self, granularity: Granularity) -> Result<WindowFile> {
        let path = self.window_path(granularity);
        match self.read_json::<WindowFile>(&path)? {
            Some(file) if file.granularity == granularity => Ok(file),
            Some(file) => {
                warn!(
                    "Window file {} holds {} data, expected {}; starting empty",
                    path.display(),
                    file.granularity,
                    granularity
                );
                Ok(WindowFile::empty(granularity))
            }
            None => Ok(WindowFile::empty(granularity)),
        }
    }

    pub fn save_window(&self, window: &WindowFile) -> Result<()> {
        self.write_json(&self.window_path(window.granularity), window)
    }

    /// Write the structured record and its text rendering; returns the JSON path
    pub fn save_report(&self, report: &ReportSnapshot, tz: Tz) -> Result<PathBuf> {
        let dir = self.reports_dir();
        let json_path = dir.join(format!("{}.json", report.file_stem()));
        let txt_path = dir.join(format!("{}.txt", report.file_stem()));

        self.write_json(&json_path, report)?;
        self.write_atomic(&txt_path, report.render_text(tz).as_bytes())?;

        debug!("Report saved to {} and {}", json_path.display(), txt_path.display());
        Ok(json_path)
    }

    pub fn load_report(
        &self,
        granularity: Granularity,
        period_id: &str,
    ) -> Result<Option<ReportSnapshot>> {
        let path = self
            .reports_dir()
            .join(format!("{}-report-{}.json", granularity, period_id));
        self.read_json(&path)
    }

    /// Period ids of stored reports for a granularity, oldest first
    pub fn list_reports(&self, granularity: Granularity) -> Result<Vec<String>> {
        let dir = self.reports_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}-report-", granularity);
        let entries = fs::read_dir(&dir).map_err(|e| TrackerError::storage(&dir, e))?;
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            debug!("No state file at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| TrackerError::storage(path, e))?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    "Corrupt state file {} ({}), moving it to {}",
                    path.display(),
                    e,
                    aside.display()
                );
                fs::rename(path, &aside).map_err(|e| TrackerError::storage(path, e))?;
                Ok(None)
            }
        }
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_atomic(path, &json)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TrackerError::storage(parent, e))?;
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, bytes).map_err(|e| TrackerError::storage(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| TrackerError::storage(path, e))?;
        Ok(())
    }
}
