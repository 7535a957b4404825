//! Command line interface of the `vigil` binary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use vigil_core::Config;
use vigil_core::domain::ScanResult;
use vigil_detector::{
    DetectionSources, Detector, HostOutcome, ReportRun, ResultsStore, SnapshotDatabase,
};

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Vulnerability detection for scanned hosts")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect vulnerabilities in the latest scan results
    Report(ReportArgs),
}

/// Arguments for the report command
#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Directory holding timestamped scan result directories
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// JSON vulnerability database snapshot
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Detect again even when results already carry vulnerability content
    #[arg(long)]
    pub refresh_cve: bool,

    /// Report only CVEs that appeared since the previous scan
    #[arg(long)]
    pub diff_plus: bool,

    /// Report CVEs that disappeared since the previous scan
    #[arg(long)]
    pub diff_minus: bool,

    /// Only log errors
    #[arg(long, short)]
    pub quiet: bool,
}

impl ReportArgs {
    /// Override configured values with the ones given on the command line
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.results_dir {
            config.report.results_dir = dir.clone();
        }
        if let Some(path) = &self.snapshot {
            config.databases.snapshot_path = path.clone();
        }
        config.report.refresh_cve |= self.refresh_cve;
        config.report.diff_plus |= self.diff_plus;
        config.report.diff_minus |= self.diff_minus;
        if self.quiet {
            config.logging.level = "error".to_string();
        }
    }
}

/// Name recorded as the reporter of every result
pub fn reporter_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Run detection over the newest result directory
pub async fn report(config: Config, reported_by: String) -> Result<ReportRun> {
    let snapshot_path = config.databases.snapshot_path.clone();
    let sources = if tokio::fs::try_exists(&snapshot_path).await.unwrap_or(false) {
        let db = SnapshotDatabase::open(&snapshot_path)
            .await
            .with_context(|| format!("failed to open {}", snapshot_path.display()))?;
        DetectionSources::from_snapshot(Arc::new(db))
    } else {
        warn!(
            path = %snapshot_path.display(),
            "Vulnerability database snapshot not found, detecting without local databases"
        );
        DetectionSources::default()
    };

    let store = ResultsStore::new(&config.report.results_dir);
    let detector = Detector::new(Arc::new(config), sources, reported_by)
        .context("failed to set up detection")?;
    let run = detector.run(&store).await.context("report failed")?;

    let failed = run
        .outcomes
        .iter()
        .filter(|outcome| **outcome == HostOutcome::Failed)
        .count();
    info!(
        dir = %run.results_dir.display(),
        hosts = run.results.len(),
        failed,
        "Report finished"
    );
    Ok(run)
}

/// One line per host for the terminal
pub fn summary_line(result: &ScanResult) -> String {
    let mut line = format!(
        "{}: {} CVEs",
        result.server_info(),
        result.scanned_cves.len()
    );
    if !result.errors.is_empty() {
        line.push_str(&format!(", {} errors", result.errors.len()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::domain::VulnInfo;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.report.diff_minus = true;
        let args = ReportArgs {
            results_dir: Some(PathBuf::from("/tmp/results")),
            diff_plus: true,
            quiet: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.report.results_dir, PathBuf::from("/tmp/results"));
        assert!(config.report.diff_plus);
        assert!(config.report.diff_minus);
        assert!(!config.report.refresh_cve);
        assert_eq!(config.logging.level, "error");
    }

    #[test]
    fn test_parse_report_command() {
        let cli = Cli::try_parse_from([
            "vigil",
            "--config",
            "vigil.toml",
            "report",
            "--refresh-cve",
            "--results-dir",
            "out",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("vigil.toml")));
        let Command::Report(args) = cli.command;
        assert!(args.refresh_cve);
        assert_eq!(args.results_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_summary_line() {
        let mut result = ScanResult {
            server_name: "web01".to_string(),
            ..Default::default()
        };
        result.scanned_cves.insert(VulnInfo::new("CVE-2021-3449"));
        assert_eq!(summary_line(&result), "web01: 1 CVEs");

        result.errors.push("enrichment failed: boom".to_string());
        assert_eq!(summary_line(&result), "web01: 1 CVEs, 1 errors");
    }
}
