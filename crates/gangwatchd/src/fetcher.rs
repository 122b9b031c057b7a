//! Scoreboard fetching.
//!
//! The fetch is the only place a cycle can fail before touching state: a
//! transport error, timeout, non-2xx status or malformed payload aborts the
//! cycle. No retry happens here; the next scheduled tick is the retry.

use async_trait::async_trait;
use gangwatch_shared::{validate_snapshot, EntityRecord, TrackerError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SourceConfig;

/// Anything that can produce a full snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<EntityRecord>, TrackerError>;
}

/// Scoreboard response body
#[derive(Debug, Deserialize)]
struct TopsPayload {
    tops: Vec<RawGang>,
}

/// Scoreboard row as served upstream
#[derive(Debug, Deserialize)]
struct RawGang {
    gang_name: String,
    xp: u64,
    level: u32,
    rank: u32,
}

impl From<RawGang> for EntityRecord {
    fn from(raw: RawGang) -> Self {
        EntityRecord {
            name: raw.gang_name,
            score: raw.xp,
            tier: raw.level,
            position_hint: raw.rank,
        }
    }
}

/// Parse and validate a scoreboard body. Missing fields, a non-list `tops`
/// or an unusable snapshot are hard failures.
pub fn parse_payload(body: &str) -> Result<Vec<EntityRecord>, TrackerError> {
    let payload: TopsPayload = serde_json::from_str(body)
        .map_err(|e| TrackerError::MalformedPayload(e.to_string()))?;

    let records: Vec<EntityRecord> = payload.tops.into_iter().map(EntityRecord::from).collect();
    validate_snapshot(&records)?;
    Ok(records)
}

/// Authenticated HTTP GET against the scoreboard API
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, TrackerError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
            token: config.api_token.clone(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<Vec<EntityRecord>, TrackerError> {
        debug!("Fetching scoreboard from {}", self.url);

        let mut request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Timeout(self.timeout.as_secs())
            } else {
                TrackerError::Fetch(format!("HTTP request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(TrackerError::Fetch(format!("HTTP error: {}", response.status())));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Timeout(self.timeout.as_secs())
            } else {
                TrackerError::Fetch(format!("Failed to read response: {}", e))
            }
        })?;

        let records = parse_payload(&body)?;
        info!("Fetched {} gangs", records.len());
        Ok(records)
    }
}
