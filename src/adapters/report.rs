//! File-based report sink.
//!
//! Each payload is written as pretty JSON to `<dir>/<claim_id>-<run_id>.json`.
//! The returned locator is `<base_url>/download/<file>` when a base URL is
//! configured, otherwise the file's path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::domain::{AggregatePayload, StorageInfo};

use super::ReportSink;

/// Writes reports into a directory
pub struct FileReportSink {
    /// Directory receiving report files
    dir: PathBuf,

    /// Public base URL the directory is served under
    base_url: Option<String>,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base_url: None,
        }
    }

    /// Serve locators under `base_url`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Directory receiving report files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn locator(&self, file_name: &str, path: &Path) -> String {
        match self.base_url {
            Some(ref base) => format!("{}/download/{}", base.trim_end_matches('/'), file_name),
            None => path.display().to_string(),
        }
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn store(&self, payload: &AggregatePayload) -> Result<StorageInfo> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create reports directory: {}", self.dir.display()))?;

        let file_name = payload.report_file_name();
        let path = self.dir.join(&file_name);

        let content =
            serde_json::to_vec_pretty(payload).context("Failed to encode report payload")?;

        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write report: {}", path.display()))?;

        Ok(StorageInfo {
            download_url: self.locator(&file_name, &path),
            path: path.display().to_string(),
        })
    }
}
