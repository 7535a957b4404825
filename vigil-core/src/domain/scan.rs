//! Scan result entities
//!
//! A [`ScanResult`] is produced by the inventory collector, then mutated in
//! place by every detection, enrichment and filter step before it is
//! serialized back to the results directory.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::family::Family;
use super::vulnerability::{CweDictEntry, VulnInfos};
use crate::application::errors::DetectionError;

/// Optional key marking results imported from an image scanner report
pub const TRIVY_TARGET_KEY: &str = "trivy-target";

/// Result of scanning one host or container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanResult {
    pub server_name: String,
    pub container: Container,
    pub family: String,
    pub release: String,
    pub running_kernel: Kernel,
    pub packages: BTreeMap<String, Package>,
    pub src_packages: BTreeMap<String, SrcPackage>,
    pub enabled_dnf_modules: Vec<String>,
    pub word_press_packages: Vec<WordPressPackage>,
    pub optional: BTreeMap<String, serde_json::Value>,
    pub scanned_cves: VulnInfos,
    pub cwe_dict: BTreeMap<String, CweDictEntry>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub reported_at: Option<DateTime<Utc>>,
    pub reported_version: String,
    pub reported_by: String,
    pub lang: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ScanResult {
    /// Parsed OS family of the host
    pub fn family(&self) -> Result<Family, DetectionError> {
        if self.family.is_empty() {
            return Err(DetectionError::configuration(format!(
                "{}: family is empty, probably an error occurred during scanning. Check the scan log",
                self.server_info()
            )));
        }
        self.family.parse()
    }

    pub fn is_container(&self) -> bool {
        !self.container.container_id.is_empty()
    }

    /// Human readable host identity, `container@server` for containers
    pub fn server_info(&self) -> String {
        if self.container.name.is_empty() {
            self.server_name.clone()
        } else {
            format!("{}@{}", self.container.name, self.server_name)
        }
    }

    /// Whether CVEs already present in the result must be kept instead of re-detected
    pub fn reuses_scanned_cves(&self) -> bool {
        if matches!(
            self.family.parse::<Family>(),
            Ok(Family::FreeBsd | Family::Raspbian)
        ) {
            return true;
        }
        self.optional.contains_key(TRIVY_TARGET_KEY)
    }

    /// A result needs detection until some vulnerability carries descriptive content
    pub fn needs_cve_refresh(&self) -> bool {
        self.scanned_cves
            .values()
            .all(|vinfo| vinfo.cve_contents.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub container_id: String,
    pub name: String,
    pub image: String,
}

/// Running kernel of the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kernel {
    pub release: String,
    pub version: String,
    pub reboot_required: bool,
}

/// Installed binary package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub release: String,
    pub new_version: String,
    pub new_release: String,
    pub arch: String,
    pub repository: String,
    pub modularity_label: String,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Installed `version-release`
    pub fn format_ver(&self) -> String {
        join_version_release(&self.version, &self.release)
    }

    /// Candidate `version-release` reported by the package manager, empty when unknown
    pub fn format_new_ver(&self) -> String {
        join_version_release(&self.new_version, &self.new_release)
    }
}

fn join_version_release(version: &str, release: &str) -> String {
    if release.is_empty() {
        version.to_string()
    } else {
        format!("{}-{}", version, release)
    }
}

/// Installed source package and the binaries built from it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SrcPackage {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub binary_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordPressPackageType {
    #[default]
    Core,
    Plugin,
    Theme,
}

/// WordPress core, plugin or theme found on the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WordPressPackage {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub package_type: WordPressPackageType,
    pub status: String,
}

impl WordPressPackage {
    pub fn is_inactive(&self) -> bool {
        self.status == "inactive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vulnerability::{CveContent, CveContentType, VulnInfo};

    #[test]
    fn test_format_ver_joins_release() {
        let mut pkg = Package::new("glibc", "2.28");
        assert_eq!(pkg.format_ver(), "2.28");
        pkg.release = "151.el8".to_string();
        assert_eq!(pkg.format_ver(), "2.28-151.el8");
        assert_eq!(pkg.format_new_ver(), "");
    }

    #[test]
    fn test_server_info_for_container() {
        let mut result = ScanResult {
            server_name: "web01".to_string(),
            ..Default::default()
        };
        assert_eq!(result.server_info(), "web01");
        result.container.name = "nginx".to_string();
        assert_eq!(result.server_info(), "nginx@web01");
    }

    #[test]
    fn test_reuse_for_imported_reports() {
        let mut result = ScanResult {
            family: "debian".to_string(),
            ..Default::default()
        };
        assert!(!result.reuses_scanned_cves());
        result
            .optional
            .insert(TRIVY_TARGET_KEY.to_string(), serde_json::json!("alpine:3.12"));
        assert!(result.reuses_scanned_cves());

        let raspbian = ScanResult {
            family: "raspbian".to_string(),
            ..Default::default()
        };
        assert!(raspbian.reuses_scanned_cves());
    }

    #[test]
    fn test_needs_refresh_until_content_present() {
        let mut result = ScanResult::default();
        assert!(result.needs_cve_refresh());

        result
            .scanned_cves
            .insert(VulnInfo::new("CVE-2021-3449"));
        assert!(result.needs_cve_refresh());

        let content = CveContent {
            content_type: CveContentType::Nvd,
            cve_id: "CVE-2021-3449".to_string(),
            ..Default::default()
        };
        if let Some(vinfo) = result.scanned_cves.get_mut("CVE-2021-3449") {
            vinfo.cve_contents.insert(CveContentType::Nvd, content);
        }
        assert!(!result.needs_cve_refresh());
    }

    #[test]
    fn test_empty_family_is_configuration_error() {
        let result = ScanResult {
            server_name: "db01".to_string(),
            ..Default::default()
        };
        let err = result.family().unwrap_err();
        assert!(err.to_string().contains("db01"));
    }

    #[test]
    fn test_scan_result_json_shape() {
        let json = r#"{
            "serverName": "web01",
            "family": "centos",
            "release": "8",
            "runningKernel": {"release": "4.18.0-240.el8.x86_64"},
            "packages": {"kernel": {"name": "kernel", "version": "4.18.0", "release": "240.el8", "arch": "x86_64"}},
            "enabledDnfModules": ["nodejs:12"]
        }"#;
        let result: ScanResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.family().unwrap(), Family::CentOS);
        assert_eq!(result.packages["kernel"].format_ver(), "4.18.0-240.el8");
        assert_eq!(result.enabled_dnf_modules, vec!["nodejs:12".to_string()]);
    }
}
