//! Report runs over timestamped result directories

mod common;

use std::sync::Arc;

use common::fixtures::{debian_host, debian_snapshot, host_with_cves, write_results_dir};
use tempfile::TempDir;
use vigil_core::Config;
use vigil_core::config::ServerConfig;
use vigil_core::domain::{
    CveContent, CveContentType, DiffStatus, ScanResult, TRIVY_TARGET_KEY, VulnInfo,
};
use vigil_detector::{DetectionSources, Detector, HostOutcome, ResultsStore};

fn detector(config: Config) -> Detector {
    let sources = DetectionSources::from_snapshot(Arc::new(debian_snapshot()));
    Detector::new(Arc::new(config), sources, "report-host").unwrap()
}

#[tokio::test]
async fn test_detect_persist_and_diff() {
    let root = TempDir::new().unwrap();
    write_results_dir(
        root.path(),
        "2021-03-01T00:00:00Z",
        &[host_with_cves("web01", &["CVE-2000-0001"])],
    )
    .await;

    let broken = ScanResult {
        server_name: "db01".to_string(),
        family: "centos".to_string(),
        ..Default::default()
    };
    let latest = write_results_dir(
        root.path(),
        "2021-03-02T00:00:00Z",
        &[debian_host("web01"), broken],
    )
    .await;

    let mut config = Config::default();
    config.report.diff_plus = true;
    config.report.diff_minus = true;

    let store = ResultsStore::new(root.path());
    let run = detector(config).run(&store).await.unwrap();
    assert_eq!(run.results_dir, latest);
    assert_eq!(run.outcomes, vec![HostOutcome::Failed, HostOutcome::Detected]);

    // Files are loaded in name order: db01.json, web01.json
    let db01 = &run.results[0];
    assert_eq!(db01.errors.len(), 1);
    assert!(db01.errors[0].contains("release is empty"));

    let web01 = &run.results[1];
    let added = web01.scanned_cves.get("CVE-2021-3449").unwrap();
    assert_eq!(added.diff_status, Some(DiffStatus::Plus));
    assert!(added.cve_contents.contains_key(&CveContentType::Debian));
    assert!(added.cve_contents.contains_key(&CveContentType::Nvd));
    assert_eq!(added.affected_packages[0].fixed_in, "1.1.1d-0+deb10u6");
    let removed = web01.scanned_cves.get("CVE-2000-0001").unwrap();
    assert_eq!(removed.diff_status, Some(DiffStatus::Minus));
    assert_eq!(
        web01.cwe_dict["476"].en.as_ref().unwrap().name,
        "NULL Pointer Dereference"
    );

    // The persisted file holds the detection, not the diff
    let persisted = store.load_dir(&latest).await.unwrap();
    let web01 = persisted.iter().find(|r| r.server_name == "web01").unwrap();
    assert_eq!(web01.reported_by, "report-host");
    assert!(web01.reported_at.is_some());
    assert_eq!(web01.scanned_cves.len(), 1);
    assert!(web01.scanned_cves.values().all(|v| v.diff_status.is_none()));
}

#[tokio::test]
async fn test_missing_oval_database_aborts_batch() {
    let root = TempDir::new().unwrap();
    write_results_dir(
        root.path(),
        "2021-03-02T00:00:00Z",
        &[debian_host("web01"), debian_host("web02")],
    )
    .await;

    let detector =
        Detector::new(Arc::new(Config::default()), DetectionSources::default(), "report-host")
            .unwrap();
    let err = detector
        .run(&ResultsStore::new(root.path()))
        .await
        .unwrap_err();
    assert!(err.is_batch_fatal());
    assert!(err.to_string().contains("Fetch OVAL"));
}

#[tokio::test]
async fn test_results_with_content_are_not_refreshed() {
    let mut result = host_with_cves("web01", &["CVE-2019-0001"]);
    if let Some(vinfo) = result.scanned_cves.get_mut("CVE-2019-0001") {
        vinfo.cve_contents.insert(
            CveContentType::Nvd,
            CveContent {
                title: "already reported".to_string(),
                ..Default::default()
            },
        );
    }
    let mut results = vec![result.clone()];

    let outcomes = detector(Config::default())
        .detect_all(&mut results)
        .await
        .unwrap();
    assert_eq!(outcomes, vec![HostOutcome::Skipped]);
    assert_eq!(results[0], result);

    let mut config = Config::default();
    config.report.refresh_cve = true;
    let outcomes = detector(config).detect_all(&mut results).await.unwrap();
    assert_eq!(outcomes, vec![HostOutcome::Detected]);
    assert!(!results[0].scanned_cves.contains("CVE-2019-0001"));
    assert!(results[0].scanned_cves.contains("CVE-2021-3449"));
}

#[tokio::test]
async fn test_filters_use_server_settings() {
    let mut config = Config::default();
    config.servers.insert(
        "web01".to_string(),
        ServerConfig {
            ignore_cves: vec!["CVE-2021-3449".to_string()],
            ..Default::default()
        },
    );
    config.filters.cvss_score_over = 5.0;

    let mut result = debian_host("web01");
    let detector = detector(config);
    let outcomes = detector
        .detect_all(std::slice::from_mut(&mut result))
        .await
        .unwrap();
    assert_eq!(outcomes, vec![HostOutcome::Detected]);
    assert!(result.scanned_cves.contains("CVE-2021-3449"));

    detector.apply_filters(&mut result).unwrap();
    assert!(result.scanned_cves.is_empty());
}

#[tokio::test]
async fn test_cpe_names_without_dictionary_fail_the_host() {
    let mut config = Config::default();
    config.servers.insert(
        "web01".to_string(),
        ServerConfig {
            cpe_names: vec!["cpe:/a:nginx:nginx:1.18.0".to_string()],
            ..Default::default()
        },
    );
    let db = Arc::new(debian_snapshot());
    let sources = DetectionSources {
        cve: None,
        ..DetectionSources::from_snapshot(db)
    };
    let detector = Detector::new(Arc::new(config), sources, "report-host").unwrap();

    let mut results = vec![debian_host("web01")];
    let outcomes = detector.detect_all(&mut results).await.unwrap();
    assert_eq!(outcomes, vec![HostOutcome::Failed]);
    assert!(results[0].errors[0].starts_with("CPE detection failed"));
}

#[tokio::test]
async fn test_empty_release_keeps_scanned_cves_of_reusing_families() {
    let host = |server_name: &str, family: &str| {
        let mut result = ScanResult {
            server_name: server_name.to_string(),
            family: family.to_string(),
            ..Default::default()
        };
        result.scanned_cves.insert(VulnInfo::new("CVE-2021-3449"));
        result
    };
    let mut trivy = host("image01", "alpine");
    trivy
        .optional
        .insert(TRIVY_TARGET_KEY.to_string(), serde_json::json!("alpine:3.12"));
    let mut results = vec![host("bsd01", "freebsd"), host("pi01", "raspbian"), trivy];

    let outcomes = detector(Config::default())
        .detect_all(&mut results)
        .await
        .unwrap();
    assert_eq!(outcomes, vec![HostOutcome::Detected; 3]);
    for result in &results {
        assert!(result.errors.is_empty(), "{}: {:?}", result.server_name, result.errors);
        let vinfo = result.scanned_cves.get("CVE-2021-3449").unwrap();
        assert!(vinfo.cve_contents.contains_key(&CveContentType::Nvd));
        assert_eq!(result.reported_by, "report-host");
    }
}

#[tokio::test]
async fn test_pseudo_server_skips_os_package_detection() {
    let mut results = vec![ScanResult {
        server_name: "pseudo01".to_string(),
        family: "pseudo".to_string(),
        ..Default::default()
    }];

    let outcomes = detector(Config::default())
        .detect_all(&mut results)
        .await
        .unwrap();
    assert_eq!(outcomes, vec![HostOutcome::Detected]);
    assert!(results[0].errors.is_empty());
    assert!(results[0].scanned_cves.is_empty());
    assert!(results[0].reported_at.is_some());
}

#[tokio::test]
async fn test_ignored_json_keys_are_cleared_from_persisted_results() {
    let root = TempDir::new().unwrap();
    let latest = write_results_dir(
        root.path(),
        "2021-03-02T00:00:00Z",
        &[debian_host("web01"), debian_host("web02")],
    )
    .await;

    let mut config = Config::default();
    config.servers.insert(
        "web01".to_string(),
        ServerConfig {
            ignored_json_keys: vec!["packages".to_string(), "cweDict".to_string()],
            ..Default::default()
        },
    );

    let run = detector(config)
        .run(&ResultsStore::new(root.path()))
        .await
        .unwrap();
    // The in-memory results keep every field
    assert!(run.results[0].packages.contains_key("openssl"));
    assert!(!run.results[0].cwe_dict.is_empty());

    let read = |name: &str| -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(latest.join(name)).unwrap()).unwrap()
    };
    let web01 = read("web01.json");
    assert!(web01.get("packages").is_none());
    assert!(web01.get("cweDict").is_none());
    assert!(web01["scannedCves"]["CVE-2021-3449"].is_object());

    let web02 = read("web02.json");
    assert!(web02["packages"]["openssl"].is_object());
}
