//! CVE detection by CPE name

use tracing::info;

use vigil_core::DetectionError;
use vigil_core::domain::{Confidence, ScanResult, VulnInfo};

use crate::domain::CveDriver;

/// Detect CVEs whose configurations match any of `cpe_names`.
/// Returns the number of CVEs that were not known before.
pub async fn detect_cpe_cves(
    driver: Option<&dyn CveDriver>,
    result: &mut ScanResult,
    cpe_names: &[String],
) -> Result<usize, DetectionError> {
    if cpe_names.is_empty() {
        return Ok(0);
    }
    let Some(driver) = driver else {
        return Err(DetectionError::configuration(format!(
            "CPE names {:?} are configured for {}, but no CVE dictionary is available. \
             Fetch the CVE dictionary before reporting",
            cpe_names,
            result.server_info()
        )));
    };

    let mut new_cves = 0;
    for name in cpe_names {
        for detail in driver.get_by_cpe_name(name).await? {
            match result.scanned_cves.get_mut(&detail.cve_id) {
                Some(vinfo) => {
                    vinfo.add_cpe_uri(name.as_str());
                    vinfo.add_confidence(Confidence::CPE_NAME_MATCH);
                }
                None => {
                    let mut vinfo =
                        VulnInfo::new(&detail.cve_id).with_confidence(Confidence::CPE_NAME_MATCH);
                    vinfo.add_cpe_uri(name.as_str());
                    result.scanned_cves.insert(vinfo);
                    new_cves += 1;
                }
            }
        }
    }

    info!(server = %result.server_info(), cves = new_cves, "CVEs detected with CPE");
    Ok(new_cves)
}
