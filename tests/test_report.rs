//! End to end report runs through the binary crate's entry points

mod common;

use common::{write_snapshot, write_ubuntu_result};
use tempfile::TempDir;
use vigil::cli::{ReportArgs, report, summary_line};
use vigil::{Config, HostOutcome};

#[tokio::test]
async fn test_report_with_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(dir.path());
    let results = dir.path().join("results");
    let latest = write_ubuntu_result(&results, "2021-01-27T09:00:00+09:00", "app01");

    let mut config = Config::default();
    ReportArgs {
        results_dir: Some(results.clone()),
        snapshot: Some(snapshot),
        ..Default::default()
    }
    .apply(&mut config);

    let run = report(config, "ci-runner".to_string()).await.unwrap();
    assert_eq!(run.results_dir, latest);
    assert_eq!(run.outcomes, vec![HostOutcome::Detected]);

    let app01 = &run.results[0];
    let vinfo = app01.scanned_cves.get("CVE-2021-3156").unwrap();
    assert_eq!(vinfo.affected_packages[0].name, "sudo");
    assert_eq!(vinfo.affected_packages[0].fixed_in, "1.8.31-1ubuntu1.2");
    assert_eq!(summary_line(app01), "app01: 1 CVEs");

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(latest.join("app01.json")).unwrap())
            .unwrap();
    assert_eq!(persisted["reportedBy"], "ci-runner");
    assert!(persisted["scannedCves"]["CVE-2021-3156"].is_object());
}

#[tokio::test]
async fn test_report_without_snapshot_fails_for_oval_families() {
    let dir = TempDir::new().unwrap();
    let results = dir.path().join("results");
    write_ubuntu_result(&results, "2021-01-27T09:00:00+09:00", "app01");

    let mut config = Config::default();
    ReportArgs {
        results_dir: Some(results),
        snapshot: Some(dir.path().join("missing.json")),
        ..Default::default()
    }
    .apply(&mut config);

    let err = report(config, "ci-runner".to_string()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("OVAL"));
}

#[tokio::test]
async fn test_report_without_results_dir_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.report.results_dir = dir.path().join("empty");

    assert!(report(config, "ci-runner".to_string()).await.is_err());
}
