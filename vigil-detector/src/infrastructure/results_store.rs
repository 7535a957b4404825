//! Timestamped result directories
//!
//! Layout: `{results_dir}/{RFC 3339 timestamp}/{container@}{server}.json`.
//! Directories whose names are not timestamps are ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use vigil_core::DetectionError;
use vigil_core::domain::ScanResult;

pub struct ResultsStore {
    root: PathBuf,
}

impl ResultsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name a result is persisted under
    pub fn file_name(result: &ScanResult) -> String {
        format!("{}.json", result.server_info())
    }

    /// Timestamped result directories, oldest first
    pub async fn result_dirs(&self) -> Result<Vec<PathBuf>, DetectionError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| DetectionError::io(&self.root, e))?;

        let mut dirs: Vec<(DateTime<FixedOffset>, PathBuf)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DetectionError::io(&self.root, e))?
        {
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| DetectionError::io(&path, e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match DateTime::parse_from_rfc3339(name) {
                Ok(timestamp) => dirs.push((timestamp, path)),
                Err(_) => debug!(path = %path.display(), "Skipping non-timestamp directory"),
            }
        }

        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(dirs.into_iter().map(|(_, path)| path).collect())
    }

    /// Newest result directory
    pub async fn latest_dir(&self) -> Result<PathBuf, DetectionError> {
        self.result_dirs().await?.pop().ok_or_else(|| {
            DetectionError::missing_database(format!(
                "no scan results found in {}. Run a scan before reporting",
                self.root.display()
            ))
        })
    }

    /// Result directory immediately older than `current`
    pub async fn previous_dir(&self, current: &Path) -> Result<Option<PathBuf>, DetectionError> {
        let dirs = self.result_dirs().await?;
        Ok(dirs
            .iter()
            .position(|dir| dir == current)
            .and_then(|i| i.checked_sub(1))
            .map(|i| dirs[i].clone()))
    }

    /// Every result JSON in `dir`, ordered by file name
    pub async fn load_dir(&self, dir: &Path) -> Result<Vec<ScanResult>, DetectionError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| DetectionError::io(dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DetectionError::io(dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut results = Vec::with_capacity(files.len());
        for path in files {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| DetectionError::io(&path, e))?;
            let result: ScanResult = serde_json::from_str(&raw)
                .map_err(|e| DetectionError::json(path.display().to_string(), e))?;
            results.push(result);
        }
        Ok(results)
    }

    /// Overwrite the JSON file of `result` in `dir`
    pub async fn write(&self, dir: &Path, result: &ScanResult) -> Result<PathBuf, DetectionError> {
        self.write_clearing(dir, result, &[]).await
    }

    /// Overwrite the JSON file of `result` in `dir` without the top-level
    /// `ignored_keys`. They read back as their defaults.
    pub async fn write_clearing(
        &self,
        dir: &Path,
        result: &ScanResult,
        ignored_keys: &[String],
    ) -> Result<PathBuf, DetectionError> {
        let path = dir.join(Self::file_name(result));
        let to_json = |e: serde_json::Error| DetectionError::json(result.server_info(), e);
        let json = if ignored_keys.is_empty() {
            serde_json::to_string_pretty(result).map_err(to_json)?
        } else {
            let mut value = serde_json::to_value(result).map_err(to_json)?;
            if let Some(fields) = value.as_object_mut() {
                for key in ignored_keys {
                    fields.remove(key);
                }
            }
            serde_json::to_string_pretty(&value).map_err(to_json)?
        };
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| DetectionError::io(&path, e))?;
        debug!(path = %path.display(), "Wrote scan result");
        Ok(path)
    }
}
