//! Vulnerability entities and the merge rules between detection sources
//!
//! One [`VulnInfo`] exists per CVE identifier per scan result. It is created
//! on first discovery and afterwards only extended through [`VulnInfo::merge`],
//! whose per-field precedence is:
//!
//! | Field | Rule |
//! |-------|------|
//! | `cve_contents` | keyed by content source, incoming content replaces the same source |
//! | `affected_packages` | upsert by package name, the more specific fix status wins |
//! | collections (`cpe_uris`, `confidences`, `exploits`, ...) | appended without duplicates |
//! | `diff_status` | first writer wins |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fix state label for packages with no fix available
pub const NOT_FIXED_YET: &str = "Not fixed yet";

/// Source of a piece of descriptive vulnerability content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CveContentType {
    #[serde(rename = "nvd")]
    Nvd,
    #[serde(rename = "jvn")]
    Jvn,
    #[serde(rename = "redhat")]
    RedHat,
    #[serde(rename = "redhat_api")]
    RedHatApi,
    #[serde(rename = "debian")]
    Debian,
    #[serde(rename = "debian_security_tracker")]
    DebianSecurityTracker,
    #[serde(rename = "ubuntu")]
    Ubuntu,
    #[serde(rename = "oracle")]
    Oracle,
    #[serde(rename = "amazon")]
    Amazon,
    #[serde(rename = "suse")]
    Suse,
    #[serde(rename = "alpine")]
    Alpine,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "wpscan")]
    WpScan,
    #[serde(rename = "trivy")]
    Trivy,
}

/// How a vulnerability was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    CpeNameMatch,
    OvalMatch,
    RedHatApiMatch,
    DebianSecurityTrackerMatch,
    GitHubMatch,
    WpScanMatch,
    TrivyMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confidence {
    pub score: u8,
    pub detection_method: DetectionMethod,
}

impl Confidence {
    pub const CPE_NAME_MATCH: Confidence = Confidence::exact(DetectionMethod::CpeNameMatch);
    pub const OVAL_MATCH: Confidence = Confidence::exact(DetectionMethod::OvalMatch);
    pub const RED_HAT_API_MATCH: Confidence = Confidence::exact(DetectionMethod::RedHatApiMatch);
    pub const DEBIAN_SECURITY_TRACKER_MATCH: Confidence =
        Confidence::exact(DetectionMethod::DebianSecurityTrackerMatch);
    pub const GITHUB_MATCH: Confidence = Confidence::exact(DetectionMethod::GitHubMatch);
    pub const WPSCAN_MATCH: Confidence = Confidence::exact(DetectionMethod::WpScanMatch);
    pub const TRIVY_MATCH: Confidence = Confidence::exact(DetectionMethod::TrivyMatch);

    const fn exact(detection_method: DetectionMethod) -> Self {
        Self {
            score: 100,
            detection_method,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub source: String,
    pub link: String,
    pub ref_id: String,
}

/// Descriptive content about one CVE from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CveContent {
    #[serde(rename = "type")]
    pub content_type: CveContentType,
    pub cve_id: String,
    pub title: String,
    pub summary: String,
    pub cvss2_score: f64,
    pub cvss2_vector: String,
    pub cvss2_severity: String,
    pub cvss3_score: f64,
    pub cvss3_vector: String,
    pub cvss3_severity: String,
    pub source_link: String,
    pub cwe_ids: Vec<String>,
    pub references: Vec<Reference>,
    pub published: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for CveContent {
    fn default() -> Self {
        Self {
            content_type: CveContentType::Nvd,
            cve_id: String::new(),
            title: String::new(),
            summary: String::new(),
            cvss2_score: 0.0,
            cvss2_vector: String::new(),
            cvss2_severity: String::new(),
            cvss3_score: 0.0,
            cvss3_vector: String::new(),
            cvss3_severity: String::new(),
            source_link: String::new(),
            cwe_ids: Vec::new(),
            references: Vec::new(),
            published: None,
            last_modified: None,
        }
    }
}

impl CveContent {
    /// Content with no descriptive field set carries no information
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.summary.is_empty()
            && self.cvss2_score == 0.0
            && self.cvss3_score == 0.0
            && self.cvss3_severity.is_empty()
            && self.cwe_ids.is_empty()
            && self.references.is_empty()
    }

    pub fn max_score(&self) -> f64 {
        self.cvss3_score.max(self.cvss2_score)
    }
}

/// Fix status of one affected package of a vulnerability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageFixStatus {
    pub name: String,
    pub not_fixed_yet: bool,
    pub fix_state: String,
    pub fixed_in: String,
}

impl PackageFixStatus {
    /// Explicit fixed version over not fixed yet over unknown
    pub fn specificity(&self) -> u8 {
        if !self.not_fixed_yet && !self.fixed_in.is_empty() {
            2
        } else if self.not_fixed_yet {
            1
        } else {
            0
        }
    }

    fn merge_from(&mut self, other: PackageFixStatus) {
        if other.specificity() > self.specificity() {
            *self = other;
        } else if self.fix_state.is_empty() && other.specificity() == self.specificity() {
            self.fix_state = other.fix_state;
        }
    }
}

/// Vendor advisory (RHSA, ALAS, ...) that fixes a vulnerability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistroAdvisory {
    pub advisory_id: String,
    pub severity: String,
    pub issued: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exploit {
    pub exploit_type: String,
    pub id: String,
    pub url: String,
    pub description: String,
}

/// Exploit framework module targeting a vulnerability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metasploit {
    pub name: String,
    pub title: String,
    pub description: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mitigation {
    pub content_type: CveContentType,
    pub mitigation: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Alert {
    pub url: String,
    pub title: String,
    pub team: String,
}

/// CERT alerts by language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertDict {
    pub en: Vec<Alert>,
    pub ja: Vec<Alert>,
}

impl AlertDict {
    pub fn is_empty(&self) -> bool {
        self.en.is_empty() && self.ja.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubAlertPackage {
    pub name: String,
    pub ecosystem: String,
    pub manifest_path: String,
}

/// Security alert raised by a code hosting platform for a repository dependency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubSecurityAlert {
    pub repository: String,
    pub package: GitHubAlertPackage,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub dismiss_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WpPackageFixStatus {
    pub name: String,
    pub fixed_in: String,
}

/// Change of a vulnerability relative to the previous report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffStatus {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

/// Everything known about one vulnerability on one host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VulnInfo {
    pub cve_id: String,
    pub confidences: Vec<Confidence>,
    pub affected_packages: Vec<PackageFixStatus>,
    pub distro_advisories: Vec<DistroAdvisory>,
    pub cpe_uris: Vec<String>,
    pub cve_contents: BTreeMap<CveContentType, CveContent>,
    pub exploits: Vec<Exploit>,
    pub metasploits: Vec<Metasploit>,
    pub mitigations: Vec<Mitigation>,
    pub alert_dict: AlertDict,
    pub github_security_alerts: Vec<GitHubSecurityAlert>,
    pub wp_package_fix_stats: Vec<WpPackageFixStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_status: Option<DiffStatus>,
}

fn append_if_missing<T: PartialEq>(target: &mut Vec<T>, items: impl IntoIterator<Item = T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

impl VulnInfo {
    pub fn new(cve_id: impl Into<String>) -> Self {
        Self {
            cve_id: cve_id.into(),
            ..Self::default()
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidences.push(confidence);
        self
    }

    pub fn add_confidence(&mut self, confidence: Confidence) {
        append_if_missing(&mut self.confidences, [confidence]);
    }

    pub fn add_cpe_uri(&mut self, cpe_uri: impl Into<String>) {
        append_if_missing(&mut self.cpe_uris, [cpe_uri.into()]);
    }

    /// Insert or refine the fix status of one affected package
    pub fn upsert_affected_package(&mut self, status: PackageFixStatus) {
        match self
            .affected_packages
            .iter_mut()
            .find(|existing| existing.name == status.name)
        {
            Some(existing) => existing.merge_from(status),
            None => self.affected_packages.push(status),
        }
    }

    /// Merge a contribution about the same CVE from another source
    pub fn merge(&mut self, other: VulnInfo) {
        debug_assert_eq!(self.cve_id, other.cve_id);

        append_if_missing(&mut self.confidences, other.confidences);
        append_if_missing(&mut self.cpe_uris, other.cpe_uris);
        for status in other.affected_packages {
            self.upsert_affected_package(status);
        }
        append_if_missing(&mut self.distro_advisories, other.distro_advisories);
        self.cve_contents.extend(other.cve_contents);
        append_if_missing(&mut self.exploits, other.exploits);
        append_if_missing(&mut self.metasploits, other.metasploits);
        append_if_missing(&mut self.mitigations, other.mitigations);
        append_if_missing(&mut self.alert_dict.en, other.alert_dict.en);
        append_if_missing(&mut self.alert_dict.ja, other.alert_dict.ja);
        append_if_missing(
            &mut self.github_security_alerts,
            other.github_security_alerts,
        );
        append_if_missing(&mut self.wp_package_fix_stats, other.wp_package_fix_stats);
        if self.diff_status.is_none() {
            self.diff_status = other.diff_status;
        }
    }

    /// Highest CVSS v2/v3 score across every content source
    pub fn max_cvss_score(&self) -> f64 {
        self.cve_contents
            .values()
            .map(CveContent::max_score)
            .fold(0.0, f64::max)
    }

    /// CWE identifiers referenced by any content, without the `CWE-` prefix
    pub fn cwe_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .cve_contents
            .values()
            .flat_map(|content| content.cwe_ids.iter())
            .filter_map(|id| id.strip_prefix("CWE-").map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Vulnerabilities of one scan result keyed by CVE identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VulnInfos(BTreeMap<String, VulnInfo>);

impl VulnInfos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cve_id: &str) -> Option<&VulnInfo> {
        self.0.get(cve_id)
    }

    pub fn get_mut(&mut self, cve_id: &str) -> Option<&mut VulnInfo> {
        self.0.get_mut(cve_id)
    }

    pub fn contains(&self, cve_id: &str) -> bool {
        self.0.contains_key(cve_id)
    }

    /// Insert a vulnerability, replacing any previous record with the same id
    pub fn insert(&mut self, vinfo: VulnInfo) {
        self.0.insert(vinfo.cve_id.clone(), vinfo);
    }

    /// Insert a new vulnerability or merge into the existing one.
    /// Returns true when the identifier was not known before.
    pub fn upsert(&mut self, vinfo: VulnInfo) -> bool {
        match self.0.get_mut(&vinfo.cve_id) {
            Some(existing) => {
                existing.merge(vinfo);
                false
            }
            None => {
                self.insert(vinfo);
                true
            }
        }
    }

    pub fn remove(&mut self, cve_id: &str) -> Option<VulnInfo> {
        self.0.remove(cve_id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&VulnInfo) -> bool) {
        self.0.retain(|_, vinfo| keep(vinfo));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &VulnInfo> {
        self.0.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut VulnInfo> {
        self.0.values_mut()
    }
}

impl FromIterator<VulnInfo> for VulnInfos {
    fn from_iter<I: IntoIterator<Item = VulnInfo>>(iter: I) -> Self {
        let mut infos = VulnInfos::new();
        for vinfo in iter {
            infos.upsert(vinfo);
        }
        infos
    }
}

impl IntoIterator for VulnInfos {
    type Item = VulnInfo;
    type IntoIter = std::collections::btree_map::IntoValues<String, VulnInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

/// One weakness classification entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cwe {
    pub cwe_id: String,
    pub name: String,
    pub description: String,
}

/// Weakness dictionary entry attached to a scan result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CweDictEntry {
    pub en: Option<Cwe>,
    pub ja: Option<Cwe>,
    pub owasp_top_ten_2017: String,
    pub cwe_top_twentyfive_2019: String,
    pub sans_top_twentyfive: String,
}
