//! Vigil Detector - From scan results to a filtered vulnerability report
//!
//! Runs every detection source over each scanned host, enriches what was
//! found, persists the results and prepares them for reporting.
//!
//! # Components
//!
//! | Component | Module |
//! |-----------|--------|
//! | Database access traits | [`domain::sources`] |
//! | JSON snapshot database | [`infrastructure::snapshot`] |
//! | GitHub and WPScan clients | [`infrastructure::github`], [`infrastructure::wpscan`] |
//! | Security tracker, CPE, GitHub and WordPress detection | [`services`] |
//! | Enrichment, diff and filters | [`services::enrichment`], [`services::diff`], [`services::filters`] |
//! | Per-host pipeline | [`application::pipeline`] |
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_detector::{DetectionSources, Detector, ResultsStore, SnapshotDatabase};
//!
//! let db = Arc::new(SnapshotDatabase::open(&config.databases.snapshot_path).await?);
//! let detector = Detector::new(config, DetectionSources::from_snapshot(db), "report-host")?;
//! let run = detector.run(&ResultsStore::new("results")).await?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;
