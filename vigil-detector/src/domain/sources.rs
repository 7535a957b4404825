//! Read access to the vulnerability databases consulted after OVAL
//!
//! Every trait here is implemented by the JSON snapshot database. Tests
//! implement them in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vigil_core::DetectionError;
use vigil_core::domain::{
    Alert, CveContent, Cwe, Exploit, Family, Metasploit, Mitigation, ScanResult,
};

/// A CVE the security tracker lists as unfixed for one package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnfixedCve {
    pub cve_id: String,
    /// Tracker wording such as `Will not fix` or `Affected`, empty when unknown
    pub fix_state: String,
    pub content: Option<CveContent>,
}

/// Everything the CVE dictionary holds about one identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CveDetail {
    pub cve_id: String,
    pub nvd: Option<CveContent>,
    pub jvn: Option<CveContent>,
    /// US-CERT alerts attached to the NVD entry
    pub nvd_certs: Vec<Alert>,
    /// JPCERT alerts attached to the JVN entry
    pub jvn_certs: Vec<Alert>,
    pub exploits: Vec<Exploit>,
    pub mitigations: Vec<Mitigation>,
}

impl CveDetail {
    pub fn has_content(&self) -> bool {
        self.nvd.as_ref().is_some_and(|c| !c.is_empty())
            || self.jvn.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Rankings a weakness holds in the well-known top lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CweRanks {
    pub owasp_top_ten_2017: String,
    pub cwe_top_twentyfive_2019: String,
    pub sans_top_twentyfive: String,
}

/// Security tracker (Debian security tracker, Red Hat security data)
#[async_trait]
pub trait GostDriver: Send + Sync {
    /// CVEs still unfixed for `package` on the release
    async fn get_unfixed_cves(
        &self,
        family: Family,
        release: &str,
        package: &str,
    ) -> Result<Vec<UnfixedCve>, DetectionError>;

    /// Tracker contents for already detected CVEs
    async fn get_cve_contents(
        &self,
        family: Family,
        cve_ids: &[String],
    ) -> Result<Vec<CveContent>, DetectionError>;
}

/// NVD and JVN dictionary
#[async_trait]
pub trait CveDriver: Send + Sync {
    /// Details of the identifiers that are known, unknown ones are omitted
    async fn get_cve_details(&self, cve_ids: &[String]) -> Result<Vec<CveDetail>, DetectionError>;

    /// CVEs whose configurations match the CPE name
    async fn get_by_cpe_name(&self, cpe_name: &str) -> Result<Vec<CveDetail>, DetectionError>;
}

#[async_trait]
pub trait ExploitDriver: Send + Sync {
    async fn get_exploits(&self, cve_id: &str) -> Result<Vec<Exploit>, DetectionError>;
}

#[async_trait]
pub trait MetasploitDriver: Send + Sync {
    async fn get_modules(&self, cve_id: &str) -> Result<Vec<Metasploit>, DetectionError>;
}

/// CWE dictionary keyed by numeric identifier without the `CWE-` prefix
#[async_trait]
pub trait CweDriver: Send + Sync {
    /// Dictionary entry in `lang` (`en` or `ja`)
    async fn get_cwe(&self, cwe_id: &str, lang: &str) -> Result<Option<Cwe>, DetectionError>;

    async fn get_ranks(&self, cwe_id: &str) -> Result<CweRanks, DetectionError>;
}

/// Detection of vulnerabilities in language libraries found on the host
///
/// Library scanning itself happens outside Vigil; implementations merge
/// their findings into `result.scanned_cves` and return the number of new CVEs.
#[async_trait]
pub trait LibraryDetector: Send + Sync {
    async fn detect(&self, result: &mut ScanResult) -> Result<usize, DetectionError>;
}
