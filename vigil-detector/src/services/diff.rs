//! Differences against the previous report of the same host

use vigil_core::domain::{DiffStatus, ScanResult, VulnInfo, VulnInfos};

/// Whether `current` carries newer content or a different fix state than `previous`
fn is_updated(current: &VulnInfo, previous: &VulnInfo) -> bool {
    let content_updated = current.cve_contents.iter().any(|(content_type, content)| {
        match previous.cve_contents.get(content_type) {
            Some(before) => content.last_modified > before.last_modified,
            None => true,
        }
    });
    content_updated || current.affected_packages != previous.affected_packages
}

/// The previous result of the same server and container
pub fn find_previous<'a>(
    current: &ScanResult,
    previous: &'a [ScanResult],
) -> Option<&'a ScanResult> {
    previous
        .iter()
        .find(|p| p.server_name == current.server_name && p.container.name == current.container.name)
}

/// Vulnerabilities added or updated since `previous` (`plus`) and those
/// no longer present (`minus`), each tagged with its [`DiffStatus`]
pub fn diff_vulns(current: &VulnInfos, previous: &VulnInfos, plus: bool, minus: bool) -> VulnInfos {
    let mut diffed = VulnInfos::new();

    if plus {
        for vinfo in current.values() {
            let changed = match previous.get(&vinfo.cve_id) {
                Some(before) => is_updated(vinfo, before),
                None => true,
            };
            if changed {
                let mut vinfo = vinfo.clone();
                vinfo.diff_status = Some(DiffStatus::Plus);
                diffed.insert(vinfo);
            }
        }
    }

    if minus {
        for vinfo in previous.values() {
            if !current.contains(&vinfo.cve_id) {
                let mut vinfo = vinfo.clone();
                vinfo.diff_status = Some(DiffStatus::Minus);
                diffed.insert(vinfo);
            }
        }
    }

    diffed
}

/// Replace the vulnerabilities of every result that has a previous report
/// with the difference against it. Results without one are left untouched.
pub fn apply_diff(results: &mut [ScanResult], previous: &[ScanResult], plus: bool, minus: bool) {
    for result in results.iter_mut() {
        if let Some(before) = find_previous(result, previous) {
            result.scanned_cves = diff_vulns(&result.scanned_cves, &before.scanned_cves, plus, minus);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vigil_core::domain::{CveContent, CveContentType};

    fn modified(id: &str, day: u32) -> VulnInfo {
        let mut vinfo = VulnInfo::new(id);
        vinfo.cve_contents.insert(
            CveContentType::Nvd,
            CveContent {
                last_modified: Utc.with_ymd_and_hms(2021, 3, day, 0, 0, 0).single(),
                ..Default::default()
            },
        );
        vinfo
    }

    fn vulns(items: Vec<VulnInfo>) -> VulnInfos {
        items.into_iter().collect()
    }

    #[test]
    fn test_plus_and_minus() {
        let previous = vulns(vec![modified("CVE-1", 1), modified("CVE-2", 1), modified("CVE-3", 1)]);
        let current = vulns(vec![modified("CVE-1", 1), modified("CVE-2", 5), modified("CVE-4", 1)]);

        let plus = diff_vulns(&current, &previous, true, false);
        assert_eq!(plus.ids().collect::<Vec<_>>(), vec!["CVE-2", "CVE-4"]);
        assert!(plus.values().all(|v| v.diff_status == Some(DiffStatus::Plus)));

        let minus = diff_vulns(&current, &previous, false, true);
        assert_eq!(minus.ids().collect::<Vec<_>>(), vec!["CVE-3"]);
        assert_eq!(
            minus.get("CVE-3").unwrap().diff_status,
            Some(DiffStatus::Minus)
        );

        let both = diff_vulns(&current, &previous, true, true);
        assert_eq!(both.len(), 3);
    }

    #[test]
    fn test_apply_diff_matches_host_and_container() {
        let host = ScanResult {
            server_name: "web01".to_string(),
            scanned_cves: vulns(vec![modified("CVE-1", 1), modified("CVE-2", 1)]),
            ..Default::default()
        };
        let mut container = host.clone();
        container.container.name = "nginx".to_string();

        let previous = vec![ScanResult {
            server_name: "web01".to_string(),
            scanned_cves: vulns(vec![modified("CVE-1", 1)]),
            ..Default::default()
        }];

        let mut results = vec![host, container];
        apply_diff(&mut results, &previous, true, true);

        assert_eq!(results[0].scanned_cves.ids().collect::<Vec<_>>(), vec!["CVE-2"]);
        // No previous report for the container
        assert_eq!(results[1].scanned_cves.len(), 2);
        assert!(results[1].scanned_cves.values().all(|v| v.diff_status.is_none()));
    }
}
