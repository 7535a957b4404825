//! Report filters applied after detection and diff

use regex::Regex;
use tracing::warn;

use vigil_core::DetectionError;
use vigil_core::domain::{ScanResult, VulnInfos};

/// Keep vulnerabilities scoring at least `over` (max of CVSS v2/v3 across contents)
pub fn filter_by_cvss_over(vulns: &mut VulnInfos, over: f64) {
    if over <= 0.0 {
        return;
    }
    vulns.retain(|v| v.max_cvss_score() >= over);
}

/// Drop vulnerabilities whose affected packages are all unfixed.
///
/// CPE-detected vulnerabilities are always kept. So are vulnerabilities
/// with no affected packages at all, such as GitHub alerts or WordPress
/// findings. They carry no fix state and are not treated as unfixed.
pub fn filter_unfixed(vulns: &mut VulnInfos, ignore_unfixed: bool) {
    if !ignore_unfixed {
        return;
    }
    vulns.retain(|v| {
        if !v.cpe_uris.is_empty() {
            return true;
        }
        v.affected_packages.is_empty() || !v.affected_packages.iter().all(|p| p.not_fixed_yet)
    });
}

pub fn filter_ignore_cves(vulns: &mut VulnInfos, ignore_cves: &[String]) {
    vulns.retain(|v| !ignore_cves.contains(&v.cve_id));
}

/// Drop vulnerabilities whose affected packages all match an ignore pattern
pub fn filter_ignore_pkgs(
    vulns: &mut VulnInfos,
    patterns: &[String],
) -> Result<(), DetectionError> {
    if patterns.is_empty() {
        return Ok(());
    }
    let regexes = patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                DetectionError::configuration(format!("invalid ignore package pattern {:?}: {}", p, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    vulns.retain(|v| {
        if v.affected_packages.is_empty() {
            return true;
        }
        !v.affected_packages
            .iter()
            .all(|p| regexes.iter().any(|re| re.is_match(&p.name)))
    });
    Ok(())
}

/// Drop vulnerabilities without any CVSS score
pub fn filter_unscored(vulns: &mut VulnInfos, ignore_unscored: bool) {
    if ignore_unscored {
        vulns.retain(|v| v.max_cvss_score() > 0.0);
    }
}

/// Drop vulnerabilities that only affect inactive WordPress plugins or themes
pub fn filter_inactive_wordpress(result: &mut ScanResult, detect_inactive: bool) {
    if detect_inactive {
        return;
    }
    let packages = &result.word_press_packages;
    result.scanned_cves.retain(|v| {
        if v.wp_package_fix_stats.is_empty() {
            return true;
        }
        v.wp_package_fix_stats.iter().any(|stat| {
            match packages.iter().find(|p| p.name == stat.name) {
                Some(package) => !package.is_inactive(),
                None => {
                    warn!(package = %stat.name, "WordPress package of a vulnerability not found");
                    false
                }
            }
        })
    });
}
