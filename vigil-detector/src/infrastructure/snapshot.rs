//! JSON snapshot database
//!
//! A single JSON document that bundles everything the offline mode needs:
//!
//! ```json
//! {
//!   "oval":        { "<family>": { "<release>": { "lastModified": "...", "definitions": [...] } } },
//!   "gost":        { "<family>": { "unfixed": { "<release>": { "<package>": [...] } }, "contents": { "<cve>": {...} } } },
//!   "cves":        { "<cve>": { "nvd": {...}, "jvn": {...}, ... } },
//!   "cpes":        { "<cpe name>": ["<cve>", ...] },
//!   "exploits":    { "<cve>": [...] },
//!   "metasploits": { "<cve>": [...] },
//!   "cwes":        { "en": { "<id>": {...} }, "ja": { ... }, "ranks": { "<id>": {...} } }
//! }
//! ```
//!
//! Every section is optional. A family or release missing from `oval`
//! reports `has_data == false`, which makes detection ask for a fetch.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use vigil_core::DetectionError;
use vigil_core::domain::{CveContent, Cwe, Exploit, Family, Metasploit};
use vigil_oval::{AdvisoryDefinition, OvalDriver};

use crate::domain::{
    CveDetail, CveDriver, CweDriver, CweRanks, ExploitDriver, GostDriver, MetasploitDriver,
    UnfixedCve,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OvalRelease {
    pub last_modified: Option<DateTime<Utc>>,
    pub definitions: Vec<AdvisoryDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GostFamily {
    /// release -> package -> unfixed CVEs
    pub unfixed: BTreeMap<String, BTreeMap<String, Vec<UnfixedCve>>>,
    pub contents: BTreeMap<String, CveContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CweSection {
    pub en: BTreeMap<String, Cwe>,
    pub ja: BTreeMap<String, Cwe>,
    pub ranks: BTreeMap<String, CweRanks>,
}

/// Contents of a snapshot file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotData {
    pub oval: BTreeMap<String, BTreeMap<String, OvalRelease>>,
    pub gost: BTreeMap<String, GostFamily>,
    pub cves: BTreeMap<String, CveDetail>,
    pub cpes: BTreeMap<String, Vec<String>>,
    pub exploits: BTreeMap<String, Vec<Exploit>>,
    pub metasploits: BTreeMap<String, Vec<Metasploit>>,
    pub cwes: CweSection,
}

/// In-memory database loaded from a snapshot file
#[derive(Debug, Clone, Default)]
pub struct SnapshotDatabase {
    data: SnapshotData,
}

impl SnapshotDatabase {
    pub fn new(data: SnapshotData) -> Self {
        Self { data }
    }

    /// Load a snapshot file
    pub async fn open(path: &Path) -> Result<Self, DetectionError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DetectionError::io(path, e))?;
        let db = Self::from_json(&raw)
            .map_err(|e| DetectionError::json(format!("snapshot {}", path.display()), e))?;

        info!(
            path = %path.display(),
            oval_families = db.data.oval.len(),
            cves = db.data.cves.len(),
            "Loaded vulnerability snapshot"
        );
        Ok(db)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    fn oval_release(&self, family: Family, release: &str) -> Option<&OvalRelease> {
        self.data.oval.get(family.as_str())?.get(release)
    }
}

#[async_trait]
impl OvalDriver for SnapshotDatabase {
    async fn get_by_pack_name(
        &self,
        family: Family,
        release: &str,
        package: &str,
        arch: &str,
    ) -> Result<Vec<AdvisoryDefinition>, DetectionError> {
        let Some(oval) = self.oval_release(family, release) else {
            return Ok(Vec::new());
        };

        Ok(oval
            .definitions
            .iter()
            .filter(|def| {
                def.affected_packs.iter().any(|pack| {
                    pack.name == package
                        && (arch.is_empty() || pack.arch.is_empty() || pack.arch == arch)
                })
            })
            .cloned()
            .collect())
    }

    async fn has_data(&self, family: Family, release: &str) -> Result<bool, DetectionError> {
        Ok(self.oval_release(family, release).is_some())
    }

    async fn last_modified(
        &self,
        family: Family,
        release: &str,
    ) -> Result<Option<DateTime<Utc>>, DetectionError> {
        Ok(self
            .oval_release(family, release)
            .and_then(|oval| oval.last_modified))
    }
}

#[async_trait]
impl GostDriver for SnapshotDatabase {
    async fn get_unfixed_cves(
        &self,
        family: Family,
        release: &str,
        package: &str,
    ) -> Result<Vec<UnfixedCve>, DetectionError> {
        Ok(self
            .data
            .gost
            .get(family.as_str())
            .and_then(|gost| gost.unfixed.get(release))
            .and_then(|packages| packages.get(package))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_cve_contents(
        &self,
        family: Family,
        cve_ids: &[String],
    ) -> Result<Vec<CveContent>, DetectionError> {
        let Some(gost) = self.data.gost.get(family.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(cve_ids
            .iter()
            .filter_map(|id| gost.contents.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl CveDriver for SnapshotDatabase {
    async fn get_cve_details(&self, cve_ids: &[String]) -> Result<Vec<CveDetail>, DetectionError> {
        Ok(cve_ids
            .iter()
            .filter_map(|id| {
                self.data.cves.get(id).map(|detail| CveDetail {
                    cve_id: id.clone(),
                    ..detail.clone()
                })
            })
            .collect())
    }

    async fn get_by_cpe_name(&self, cpe_name: &str) -> Result<Vec<CveDetail>, DetectionError> {
        let Some(ids) = self.data.cpes.get(cpe_name) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .map(|id| {
                self.data
                    .cves
                    .get(id)
                    .map(|detail| CveDetail {
                        cve_id: id.clone(),
                        ..detail.clone()
                    })
                    .unwrap_or_else(|| CveDetail {
                        cve_id: id.clone(),
                        ..Default::default()
                    })
            })
            .collect())
    }
}

#[async_trait]
impl ExploitDriver for SnapshotDatabase {
    async fn get_exploits(&self, cve_id: &str) -> Result<Vec<Exploit>, DetectionError> {
        Ok(self.data.exploits.get(cve_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MetasploitDriver for SnapshotDatabase {
    async fn get_modules(&self, cve_id: &str) -> Result<Vec<Metasploit>, DetectionError> {
        Ok(self.data.metasploits.get(cve_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CweDriver for SnapshotDatabase {
    async fn get_cwe(&self, cwe_id: &str, lang: &str) -> Result<Option<Cwe>, DetectionError> {
        let dict = match lang {
            "ja" => &self.data.cwes.ja,
            _ => &self.data.cwes.en,
        };
        Ok(dict.get(cwe_id).cloned())
    }

    async fn get_ranks(&self, cwe_id: &str) -> Result<CweRanks, DetectionError> {
        Ok(self.data.cwes.ranks.get(cwe_id).cloned().unwrap_or_default())
    }
}
