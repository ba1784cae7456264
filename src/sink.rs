use crate::config::OutputConfig;
use crate::error::Result;
use crate::types::ConcertRecord;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Delivers a finished batch: a dated JSON artifact on disk first, then one
/// POST of the same array to the downstream endpoint.
///
/// The artifact is written before the POST on purpose; it survives a dead
/// endpoint. A non-2xx response is logged and left to the caller.
pub struct OutputSink {
    client: reqwest::Client,
    submit_url: String,
    dir: PathBuf,
}

impl OutputSink {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            submit_url: config.submit_url.clone(),
            dir: PathBuf::from(&config.dir),
        }
    }

    fn dated_path(&self, date: NaiveDate, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}", date.format("%Y-%m-%d")))
    }

    /// Writes the run artifact `<dir>/YYYY-MM-DD.json`.
    pub fn write_artifact(&self, records: &[ConcertRecord], date: NaiveDate) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dated_path(date, ".json");
        fs::write(&path, serde_json::to_string_pretty(records)?)?;
        info!(path = %path.display(), records = records.len(), "Wrote run artifact");
        Ok(path)
    }

    /// Writes the intermediate crawl output `<dir>/YYYY-MM-DD.raw.json`, the
    /// array of assembled text blocks awaiting extraction.
    pub fn write_raw_texts(&self, texts: &[String], date: NaiveDate) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dated_path(date, ".raw.json");
        fs::write(&path, serde_json::to_string_pretty(texts)?)?;
        info!(path = %path.display(), texts = texts.len(), "Wrote raw crawl output");
        Ok(path)
    }

    pub fn read_raw_texts(path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// POSTs the full array as JSON. Returns the response status; non-2xx is
    /// not retried here.
    pub async fn submit(&self, records: &[ConcertRecord]) -> Result<u16> {
        let response = self
            .client
            .post(&self.submit_url)
            .header("Content-Type", "application/json")
            .json(records)
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            info!(status, records = records.len(), "Submitted batch downstream");
        } else {
            warn!(status, "Downstream endpoint refused the batch");
        }
        Ok(status)
    }
}
