//! Enrichment of detected vulnerabilities with descriptive content
//!
//! Runs after every detection source. Each step only adds to the records
//! that already exist; none of them creates a new vulnerability.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use tracing::{debug, info};

use vigil_core::DetectionError;
use vigil_core::domain::{
    Alert, AlertDict, CveContentType, Cwe, CweDictEntry, ScanResult, VulnInfo,
};

use crate::domain::{CveDetail, CveDriver, CweDriver, ExploitDriver, MetasploitDriver};

fn with_team(alerts: &[Alert], team: &str) -> Vec<Alert> {
    alerts
        .iter()
        .map(|alert| Alert {
            team: team.to_string(),
            ..alert.clone()
        })
        .collect()
}

fn detail_patch(detail: CveDetail) -> VulnInfo {
    let mut patch = VulnInfo::new(&detail.cve_id);
    for (content_type, content) in [
        (CveContentType::Nvd, detail.nvd),
        (CveContentType::Jvn, detail.jvn),
    ] {
        if let Some(mut content) = content
            && !content.is_empty()
        {
            content.content_type = content_type;
            content.cve_id = detail.cve_id.clone();
            patch.cve_contents.insert(content_type, content);
        }
    }
    patch.alert_dict = AlertDict {
        en: with_team(&detail.nvd_certs, "us"),
        ja: with_team(&detail.jvn_certs, "jp"),
    };
    patch.exploits = detail.exploits;
    patch.mitigations = detail.mitigations;
    patch
}

/// Attach NVD and JVN contents, CERT alerts, exploit references and
/// mitigations. Returns the number of vulnerabilities the dictionary knew.
pub async fn fill_cve_details(
    driver: &dyn CveDriver,
    result: &mut ScanResult,
) -> Result<usize, DetectionError> {
    let ids: Vec<String> = result.scanned_cves.ids().cloned().collect();
    if ids.is_empty() {
        return Ok(0);
    }

    let details = driver.get_cve_details(&ids).await?;
    let mut filled = 0;
    for detail in details {
        if let Some(vinfo) = result.scanned_cves.get_mut(&detail.cve_id) {
            vinfo.merge(detail_patch(detail));
            filled += 1;
        }
    }
    debug!(server = %result.server_info(), filled, "Filled CVE dictionary details");
    Ok(filled)
}

/// Attach exploit database entries. Returns the number of CVEs with exploits.
pub async fn fill_exploits(
    driver: &dyn ExploitDriver,
    result: &mut ScanResult,
) -> Result<usize, DetectionError> {
    let ids: Vec<String> = result.scanned_cves.ids().cloned().collect();
    let found = try_join_all(ids.iter().map(|id| driver.get_exploits(id))).await?;

    let mut with_exploits = 0;
    for (id, exploits) in ids.iter().zip(found) {
        if exploits.is_empty() {
            continue;
        }
        if let Some(vinfo) = result.scanned_cves.get_mut(id) {
            let mut patch = VulnInfo::new(id);
            patch.exploits = exploits;
            vinfo.merge(patch);
            with_exploits += 1;
        }
    }
    info!(server = %result.server_info(), cves = with_exploits, "Exploits detected");
    Ok(with_exploits)
}

/// Attach Metasploit modules. Returns the number of CVEs with modules.
pub async fn fill_metasploits(
    driver: &dyn MetasploitDriver,
    result: &mut ScanResult,
) -> Result<usize, DetectionError> {
    let ids: Vec<String> = result.scanned_cves.ids().cloned().collect();
    let found = try_join_all(ids.iter().map(|id| driver.get_modules(id))).await?;

    let mut with_modules = 0;
    for (id, modules) in ids.iter().zip(found) {
        if modules.is_empty() {
            continue;
        }
        if let Some(vinfo) = result.scanned_cves.get_mut(id) {
            let mut patch = VulnInfo::new(id);
            patch.metasploits = modules;
            vinfo.merge(patch);
            with_modules += 1;
        }
    }
    info!(server = %result.server_info(), cves = with_modules, "Metasploit modules detected");
    Ok(with_modules)
}

async fn lookup_cwe(
    driver: Option<&dyn CweDriver>,
    cwe_id: &str,
    lang: &str,
) -> Result<Option<Cwe>, DetectionError> {
    match driver {
        Some(driver) => driver.get_cwe(cwe_id, lang).await,
        None => Ok(None),
    }
}

/// Build the weakness dictionary of the result from every CWE id its
/// contents reference. Ids missing from the dictionary keep an entry
/// carrying only the id.
pub async fn fill_cwe_dict(
    driver: Option<&dyn CweDriver>,
    result: &mut ScanResult,
    lang: &str,
) -> Result<(), DetectionError> {
    let ids: BTreeSet<String> = result
        .scanned_cves
        .values()
        .flat_map(VulnInfo::cwe_ids)
        .collect();

    let mut dict = BTreeMap::new();
    for id in ids {
        let mut entry = CweDictEntry::default();
        let mut known = false;

        match lookup_cwe(driver, &id, "en").await? {
            Some(cwe) => {
                entry.en = Some(cwe);
                known = true;
            }
            None => {
                debug!(cwe_id = %id, "CWE not found in English dictionary");
                entry.en = Some(Cwe {
                    cwe_id: id.clone(),
                    ..Default::default()
                });
            }
        }

        if lang == "ja" {
            match lookup_cwe(driver, &id, "ja").await? {
                Some(cwe) => {
                    entry.ja = Some(cwe);
                    known = true;
                }
                None => {
                    debug!(cwe_id = %id, "CWE not found in Japanese dictionary");
                    entry.ja = Some(Cwe {
                        cwe_id: id.clone(),
                        ..Default::default()
                    });
                }
            }
        }

        if known && let Some(driver) = driver {
            let ranks = driver.get_ranks(&id).await?;
            entry.owasp_top_ten_2017 = ranks.owasp_top_ten_2017;
            entry.cwe_top_twentyfive_2019 = ranks.cwe_top_twentyfive_2019;
            entry.sans_top_twentyfive = ranks.sans_top_twentyfive;
        }
        dict.insert(id, entry);
    }

    result.cwe_dict = dict;
    Ok(())
}
