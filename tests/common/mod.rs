//! Shared helpers for the binary crate tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

/// Snapshot with one Ubuntu 20.04 OVAL definition for sudo
pub fn write_snapshot(dir: &Path) -> PathBuf {
    let snapshot = json!({
        "oval": {
            "ubuntu": {
                "20.04": {
                    "lastModified": Utc::now(),
                    "definitions": [{
                        "DefinitionID": "oval:com.ubuntu.focal:def:202131560000000",
                        "Title": "CVE-2021-3156 on Ubuntu 20.04 LTS (focal) - high.",
                        "Description": "Heap-based buffer overflow in sudo",
                        "Advisory": {"Severity": "High", "Cves": [{"CveID": "CVE-2021-3156"}]},
                        "AffectedPacks": [{"Name": "sudo", "Version": "1.8.31-1ubuntu1.2"}]
                    }]
                }
            }
        }
    });
    let path = dir.join("vigil-db.json");
    std::fs::write(&path, snapshot.to_string()).unwrap();
    path
}

/// Write `{results}/{timestamp}/{server}.json` for an Ubuntu host with sudo installed
pub fn write_ubuntu_result(results: &Path, timestamp: &str, server: &str) -> PathBuf {
    let dir = results.join(timestamp);
    std::fs::create_dir_all(&dir).unwrap();
    let result = json!({
        "serverName": server,
        "family": "ubuntu",
        "release": "20.04",
        "packages": {
            "sudo": {"name": "sudo", "version": "1.8.31-1ubuntu1"}
        }
    });
    std::fs::write(dir.join(format!("{}.json", server)), result.to_string()).unwrap();
    dir
}
