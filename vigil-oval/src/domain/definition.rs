//! OVAL advisory definitions as served by the OVAL dictionary
//!
//! Field names follow the dictionary's JSON encoding, so the same types
//! decode both HTTP responses and the local snapshot database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One advisory describing affected packages for a release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdvisoryDefinition {
    /// Empty for feeds that are not natively OVAL (e.g. Alpine secdb)
    #[serde(rename = "DefinitionID")]
    pub definition_id: String,
    pub title: String,
    pub description: String,
    pub advisory: Advisory,
    pub debian: Option<DebianInfo>,
    pub affected_packs: Vec<AffectedPack>,
    pub references: Vec<OvalReference>,
}

impl AdvisoryDefinition {
    /// CVE identifiers this definition covers, without duplicates
    pub fn cve_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let debian_id = self
            .debian
            .as_ref()
            .map(|d| d.cve_id.as_str())
            .filter(|id| !id.is_empty());
        let advisory_ids = self.advisory.cves.iter().map(|cve| cve.cve_id.as_str());
        for id in debian_id.into_iter().chain(advisory_ids) {
            if !id.is_empty() && !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }

    /// Advisory CVE entry for `cve_id`, if present
    pub fn advisory_cve(&self, cve_id: &str) -> Option<&AdvisoryCve> {
        self.advisory.cves.iter().find(|cve| cve.cve_id == cve_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Advisory {
    pub severity: String,
    pub cves: Vec<AdvisoryCve>,
    pub issued: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// CVE entry of an advisory
///
/// `cvss2`/`cvss3` hold `score/vector`, e.g. `7.5/CVSS:3.1/AV:N/...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdvisoryCve {
    #[serde(rename = "CveID")]
    pub cve_id: String,
    pub cvss2: String,
    pub cvss3: String,
    pub cwe: String,
    pub impact: String,
    pub href: String,
    pub public: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DebianInfo {
    #[serde(rename = "CveID")]
    pub cve_id: String,
    pub more_info: String,
}

/// Affected package record of a definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AffectedPack {
    pub name: String,
    /// Fixed version, or the vulnerable version when `not_fixed_yet`
    pub version: String,
    pub arch: String,
    pub not_fixed_yet: bool,
    pub modularity_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OvalReference {
    pub source: String,
    #[serde(rename = "RefID")]
    pub ref_id: String,
    #[serde(rename = "RefURL")]
    pub ref_url: String,
}
