//! Vulnerabilities of WordPress core, plugins and themes

use std::cmp::Ordering;

use semver::{BuildMetadata, Prerelease, Version};
use tracing::{info, warn};

use vigil_core::DetectionError;
use vigil_core::domain::{
    Confidence, CveContent, CveContentType, Reference, ScanResult, VulnInfo, WordPressPackage,
    WpPackageFixStatus,
};

use crate::infrastructure::{WpScanClient, WpVulnerability};

/// Lenient semver reading of a WordPress version
///
/// Versions with fewer or more than three numeric parts are accepted
/// (`5.4` -> `5.4.0`, `5.3.2.1` keeps `.1` as build metadata). A letter
/// suffix such as `4.9.8a` becomes the pre-release.
pub fn parse_wp_version(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let numeric_len = core
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .len();
    let (core, suffix) = core.split_at(numeric_len);
    let pre = match (suffix.is_empty(), pre) {
        (true, None) => None,
        (true, Some(pre)) => Some(pre.to_string()),
        (false, None) => Some(suffix.to_string()),
        (false, Some(pre)) => Some(format!("{}.{}", suffix, pre)),
    };

    let mut parts: Vec<u64> = core
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<_>>()?;
    while parts.len() > 3 && parts.last() == Some(&0) {
        parts.pop();
    }
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);

    let mut parsed = Version::new(part(0), part(1), part(2));
    if let Some(pre) = pre {
        parsed.pre = Prerelease::new(&pre).ok()?;
    }
    if parts.len() > 3 {
        let extra: Vec<String> = parts[3..].iter().map(u64::to_string).collect();
        parsed.build = BuildMetadata::new(&extra.join(".")).ok()?;
    }
    Some(parsed)
}

/// Semver ordering of two WordPress versions read with [`parse_wp_version`].
/// `None` when either side is not a version.
pub fn compare_wp_versions(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_wp_version(a)?.cmp(&parse_wp_version(b)?))
}

fn affects(package: &WordPressPackage, vuln: &WpVulnerability) -> bool {
    let fixed_in = vuln.fixed_in.as_deref().unwrap_or_default();
    if fixed_in.is_empty() {
        return true;
    }
    match compare_wp_versions(&package.version, fixed_in) {
        Some(ordering) => ordering == Ordering::Less,
        None => {
            warn!(
                package = %package.name,
                installed = %package.version,
                fixed_in = %fixed_in,
                "Failed to compare WordPress versions"
            );
            false
        }
    }
}

fn to_vuln_infos(package: &WordPressPackage, vuln: &WpVulnerability) -> Vec<VulnInfo> {
    vuln.cve_ids()
        .into_iter()
        .map(|cve_id| {
            let content = CveContent {
                content_type: CveContentType::WpScan,
                cve_id: cve_id.clone(),
                title: vuln.title.clone(),
                summary: vuln.vuln_type.clone(),
                source_link: format!("https://wpscan.com/vulnerability/{}", vuln.id),
                references: vuln
                    .references
                    .url
                    .iter()
                    .map(|url| Reference {
                        source: "wpscan".to_string(),
                        link: url.clone(),
                        ref_id: String::new(),
                    })
                    .collect(),
                published: vuln.published_date.or(vuln.created_at),
                last_modified: vuln.updated_at,
                ..Default::default()
            };

            let mut vinfo = VulnInfo::new(&cve_id).with_confidence(Confidence::WPSCAN_MATCH);
            vinfo.cve_contents.insert(CveContentType::WpScan, content);
            vinfo.wp_package_fix_stats.push(WpPackageFixStatus {
                name: package.name.clone(),
                fixed_in: vuln.fixed_in.clone().unwrap_or_default(),
            });
            vinfo
        })
        .collect()
}

/// Detect vulnerabilities of the WordPress packages found on the host.
/// Returns the number of CVEs that were not known before.
pub async fn detect_wordpress_cves(
    client: &WpScanClient,
    result: &mut ScanResult,
) -> Result<usize, DetectionError> {
    let packages = result.word_press_packages.clone();
    let mut new_cves = 0;
    for package in &packages {
        for vuln in client.fetch_vulnerabilities(package).await? {
            if !affects(package, &vuln) {
                continue;
            }
            for vinfo in to_vuln_infos(package, &vuln) {
                if result.scanned_cves.upsert(vinfo) {
                    new_cves += 1;
                }
            }
        }
    }

    info!(
        server = %result.server_info(),
        packages = packages.len(),
        cves = new_cves,
        "CVEs detected with WPScan"
    );
    Ok(new_cves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::domain::WordPressPackageType;

    fn plugin(version: &str) -> WordPressPackage {
        WordPressPackage {
            name: "contact-form-7".to_string(),
            version: version.to_string(),
            package_type: WordPressPackageType::Plugin,
            status: "active".to_string(),
        }
    }

    #[test]
    fn test_compare_wp_versions() {
        assert_eq!(compare_wp_versions("5.3", "5.3.1"), Some(Ordering::Less));
        assert_eq!(compare_wp_versions("5.10", "5.9.3"), Some(Ordering::Greater));
        assert_eq!(compare_wp_versions("5.4.0", "5.4"), Some(Ordering::Equal));
        assert_eq!(compare_wp_versions("trunk", "5.4"), None);
        assert_eq!(compare_wp_versions("v5.4.2", "5.4.2"), Some(Ordering::Equal));
        assert_eq!(compare_wp_versions("5.3.2.1", "5.3.2.2"), Some(Ordering::Less));
        assert_eq!(compare_wp_versions("5.3.2.0", "5.3.2"), Some(Ordering::Equal));
    }

    #[test]
    fn test_pre_releases_sort_before_their_release() {
        assert_eq!(compare_wp_versions("2.1.0-beta1", "2.1.0"), Some(Ordering::Less));
        assert_eq!(compare_wp_versions("4.9.8a", "4.9.9"), Some(Ordering::Less));
        assert_eq!(compare_wp_versions("5.7-RC1", "5.7"), Some(Ordering::Less));
        assert_eq!(compare_wp_versions("1.0.0", "1.0.0-rc.1"), Some(Ordering::Greater));

        let vuln = WpVulnerability {
            id: "10510".to_string(),
            fixed_in: Some("2.1.0".to_string()),
            ..Default::default()
        };
        assert!(affects(&plugin("2.1.0-beta1"), &vuln));
        assert!(affects(&plugin("5.7-RC1"), &WpVulnerability {
            fixed_in: Some("5.7".to_string()),
            ..Default::default()
        }));
        assert!(!affects(&plugin("2.1.0"), &vuln));
    }

    #[test]
    fn test_affects() {
        let mut vuln = WpVulnerability {
            id: "10020".to_string(),
            fixed_in: Some("5.3.1".to_string()),
            ..Default::default()
        };
        assert!(affects(&plugin("5.3"), &vuln));
        assert!(!affects(&plugin("5.3.1"), &vuln));
        assert!(!affects(&plugin("dev"), &vuln));

        vuln.fixed_in = None;
        assert!(affects(&plugin("5.3.1"), &vuln));
    }

    #[test]
    fn test_vuln_info_records_fix() {
        let vuln = WpVulnerability {
            id: "10020".to_string(),
            title: "Contact Form 7 < 5.3.2 - Unrestricted File Upload".to_string(),
            fixed_in: Some("5.3.2".to_string()),
            references: crate::infrastructure::WpReferences {
                cve: vec!["2020-35489".to_string()],
                url: vec!["https://contactform7.com/2020/12/17/contact-form-7-532/".to_string()],
            },
            ..Default::default()
        };
        let vinfos = to_vuln_infos(&plugin("5.3.1"), &vuln);
        assert_eq!(vinfos.len(), 1);
        assert_eq!(vinfos[0].cve_id, "CVE-2020-35489");
        assert_eq!(vinfos[0].confidences, vec![Confidence::WPSCAN_MATCH]);
        assert_eq!(
            vinfos[0].wp_package_fix_stats,
            vec![WpPackageFixStatus {
                name: "contact-form-7".to_string(),
                fixed_in: "5.3.2".to_string(),
            }]
        );
    }
}
