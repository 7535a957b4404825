//! Test data fixtures for vigil-detector

use std::path::{Path, PathBuf};

use chrono::Utc;
use vigil_core::domain::{Package, ScanResult, VulnInfo};
use vigil_detector::SnapshotDatabase;

/// Snapshot with Debian 10 OVAL data for openssl and NVD content for its CVE
pub fn debian_snapshot() -> SnapshotDatabase {
    let raw = serde_json::json!({
        "oval": {
            "debian": {
                "10": {
                    "lastModified": Utc::now(),
                    "definitions": [{
                        "DefinitionID": "oval:org.debian:def:3449",
                        "Title": "CVE-2021-3449",
                        "Description": "NULL pointer dereference in signature_algorithms processing",
                        "Debian": {"CveID": "CVE-2021-3449"},
                        "AffectedPacks": [{"Name": "openssl", "Version": "1.1.1d-0+deb10u6"}]
                    }]
                }
            }
        },
        "cves": {
            "CVE-2021-3449": {
                "nvd": {
                    "type": "nvd",
                    "cveId": "CVE-2021-3449",
                    "cvss3Score": 5.9,
                    "cvss3Severity": "MEDIUM",
                    "cweIds": ["CWE-476"]
                }
            }
        },
        "cwes": {
            "en": {"476": {"cweId": "476", "name": "NULL Pointer Dereference"}}
        }
    });
    SnapshotDatabase::from_json(&raw.to_string()).expect("fixture snapshot is valid")
}

/// Debian 10 host with a vulnerable openssl
pub fn debian_host(server_name: &str) -> ScanResult {
    let mut result = ScanResult {
        server_name: server_name.to_string(),
        family: "debian".to_string(),
        release: "10".to_string(),
        ..Default::default()
    };
    result.packages.insert(
        "openssl".to_string(),
        Package::new("openssl", "1.1.1d-0+deb10u3"),
    );
    result
}

/// Result carrying only the given CVE ids
pub fn host_with_cves(server_name: &str, ids: &[&str]) -> ScanResult {
    let mut result = debian_host(server_name);
    for id in ids {
        result.scanned_cves.insert(VulnInfo::new(*id));
    }
    result
}

/// Create `{root}/{timestamp}/` holding the given results
pub async fn write_results_dir(root: &Path, timestamp: &str, results: &[ScanResult]) -> PathBuf {
    let dir = root.join(timestamp);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    for result in results {
        let path = dir.join(format!("{}.json", result.server_info()));
        tokio::fs::write(&path, serde_json::to_string(result).unwrap())
            .await
            .unwrap();
    }
    dir
}
