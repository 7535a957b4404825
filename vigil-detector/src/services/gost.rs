//! Unfixed CVEs from the distribution security trackers

use tracing::{debug, info};

use vigil_core::DetectionError;
use vigil_core::domain::{
    Confidence, CveContentType, Family, PackageFixStatus, ScanResult, VulnInfo,
};

use crate::domain::{GostDriver, UnfixedCve};

const WILL_NOT_FIX: &str = "Will not fix";

/// Tracker consulted for a host family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracker {
    Debian,
    RedHat,
}

impl Tracker {
    fn for_family(family: Family) -> Option<Self> {
        match family {
            Family::Debian | Family::Raspbian => Some(Self::Debian),
            Family::RedHat | Family::CentOS => Some(Self::RedHat),
            _ => None,
        }
    }

    fn feed_family(self) -> Family {
        match self {
            Self::Debian => Family::Debian,
            Self::RedHat => Family::RedHat,
        }
    }

    fn confidence(self) -> Confidence {
        match self {
            Self::Debian => Confidence::DEBIAN_SECURITY_TRACKER_MATCH,
            Self::RedHat => Confidence::RED_HAT_API_MATCH,
        }
    }

    fn content_type(self) -> CveContentType {
        match self {
            Self::Debian => CveContentType::DebianSecurityTracker,
            Self::RedHat => CveContentType::RedHatApi,
        }
    }
}

fn major_release(release: &str) -> &str {
    release.split('.').next().unwrap_or(release)
}

/// Detect CVEs the tracker lists as unfixed for installed packages.
/// Returns the number of CVEs that were not known before.
pub async fn detect_unfixed(
    driver: &dyn GostDriver,
    result: &mut ScanResult,
) -> Result<usize, DetectionError> {
    let family = result.family()?;
    let Some(tracker) = Tracker::for_family(family) else {
        debug!(family = %family, "No security tracker for family, skipping");
        return Ok(0);
    };
    let release = major_release(&result.release).to_string();

    // (package looked up, names recorded as affected)
    let mut lookups: Vec<(String, Vec<String>)> = result
        .packages
        .keys()
        .map(|name| (name.clone(), vec![name.clone()]))
        .collect();
    if tracker == Tracker::Debian {
        lookups.extend(
            result
                .src_packages
                .values()
                .map(|src| (src.name.clone(), src.binary_names.clone())),
        );
    }

    let mut new_cves = 0;
    for (package, affected_names) in lookups {
        let unfixed = driver
            .get_unfixed_cves(tracker.feed_family(), &release, &package)
            .await?;
        for cve in unfixed {
            if tracker == Tracker::RedHat && cve.fix_state == WILL_NOT_FIX {
                continue;
            }
            if result
                .scanned_cves
                .upsert(to_vuln_info(tracker, cve, &affected_names))
            {
                new_cves += 1;
            }
        }
    }

    info!(
        server = %result.server_info(),
        cves = new_cves,
        "Unfixed CVEs detected with security tracker"
    );
    Ok(new_cves)
}

fn to_vuln_info(tracker: Tracker, cve: UnfixedCve, affected_names: &[String]) -> VulnInfo {
    let mut vinfo = VulnInfo::new(&cve.cve_id).with_confidence(tracker.confidence());
    for name in affected_names {
        vinfo.upsert_affected_package(PackageFixStatus {
            name: name.clone(),
            not_fixed_yet: true,
            fix_state: cve.fix_state.clone(),
            fixed_in: String::new(),
        });
    }
    if let Some(mut content) = cve.content {
        content.content_type = tracker.content_type();
        content.cve_id = cve.cve_id.clone();
        vinfo.cve_contents.insert(tracker.content_type(), content);
    }
    vinfo
}

/// Attach tracker contents to every detected CVE. Only Red Hat publishes them.
pub async fn fill_tracker_contents(
    driver: &dyn GostDriver,
    result: &mut ScanResult,
) -> Result<usize, DetectionError> {
    let family = result.family()?;
    if Tracker::for_family(family) != Some(Tracker::RedHat) {
        return Ok(0);
    }

    let ids: Vec<String> = result.scanned_cves.ids().cloned().collect();
    let contents = driver.get_cve_contents(Family::RedHat, &ids).await?;
    let mut filled = 0;
    for mut content in contents {
        if let Some(vinfo) = result.scanned_cves.get_mut(&content.cve_id) {
            content.content_type = CveContentType::RedHatApi;
            vinfo.cve_contents.insert(CveContentType::RedHatApi, content);
            filled += 1;
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use vigil_core::domain::{CveContent, NOT_FIXED_YET, Package, SrcPackage};

    #[derive(Default)]
    struct InMemoryTracker {
        unfixed: HashMap<(Family, String, String), Vec<UnfixedCve>>,
        contents: Vec<CveContent>,
    }

    #[async_trait]
    impl GostDriver for InMemoryTracker {
        async fn get_unfixed_cves(
            &self,
            family: Family,
            release: &str,
            package: &str,
        ) -> Result<Vec<UnfixedCve>, DetectionError> {
            Ok(self
                .unfixed
                .get(&(family, release.to_string(), package.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn get_cve_contents(
            &self,
            _family: Family,
            cve_ids: &[String],
        ) -> Result<Vec<CveContent>, DetectionError> {
            Ok(self
                .contents
                .iter()
                .filter(|c| cve_ids.contains(&c.cve_id))
                .cloned()
                .collect())
        }
    }

    fn unfixed(cve_id: &str, fix_state: &str) -> UnfixedCve {
        UnfixedCve {
            cve_id: cve_id.to_string(),
            fix_state: fix_state.to_string(),
            content: None,
        }
    }

    #[tokio::test]
    async fn test_debian_source_package_maps_to_binaries() {
        let mut tracker = InMemoryTracker::default();
        tracker.unfixed.insert(
            (Family::Debian, "10".to_string(), "glibc".to_string()),
            vec![unfixed("CVE-2019-9192", "")],
        );

        let mut result = ScanResult {
            family: "debian".to_string(),
            release: "10.9".to_string(),
            ..Default::default()
        };
        result.src_packages.insert(
            "glibc".to_string(),
            SrcPackage {
                name: "glibc".to_string(),
                version: "2.28-10".to_string(),
                binary_names: vec!["libc6".to_string(), "libc-bin".to_string()],
                ..Default::default()
            },
        );

        let detected = detect_unfixed(&tracker, &mut result).await.unwrap();
        assert_eq!(detected, 1);
        let vinfo = result.scanned_cves.get("CVE-2019-9192").unwrap();
        assert_eq!(
            vinfo.confidences,
            vec![Confidence::DEBIAN_SECURITY_TRACKER_MATCH]
        );
        let names: Vec<_> = vinfo.affected_packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["libc6", "libc-bin"]);
        assert!(vinfo.affected_packages.iter().all(|p| p.not_fixed_yet));
    }

    #[tokio::test]
    async fn test_redhat_skips_will_not_fix() {
        let mut tracker = InMemoryTracker::default();
        tracker.unfixed.insert(
            (Family::RedHat, "8".to_string(), "vim".to_string()),
            vec![unfixed("CVE-2021-3903", WILL_NOT_FIX), unfixed("CVE-2021-3927", "Affected")],
        );

        let mut result = ScanResult {
            family: "centos".to_string(),
            release: "8.3.2011".to_string(),
            ..Default::default()
        };
        result
            .packages
            .insert("vim".to_string(), Package::new("vim", "8.0.1763"));

        assert_eq!(detect_unfixed(&tracker, &mut result).await.unwrap(), 1);
        assert!(!result.scanned_cves.contains("CVE-2021-3903"));
        let vinfo = result.scanned_cves.get("CVE-2021-3927").unwrap();
        assert_eq!(vinfo.affected_packages[0].fix_state, "Affected");
        assert_ne!(vinfo.affected_packages[0].fix_state, NOT_FIXED_YET);
    }

    #[tokio::test]
    async fn test_other_families_are_skipped() {
        let tracker = InMemoryTracker::default();
        let mut result = ScanResult {
            family: "alpine".to_string(),
            release: "3.12".to_string(),
            ..Default::default()
        };
        assert_eq!(detect_unfixed(&tracker, &mut result).await.unwrap(), 0);
        assert_eq!(fill_tracker_contents(&tracker, &mut result).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redhat_contents_are_attached() {
        let tracker = InMemoryTracker {
            contents: vec![CveContent {
                cve_id: "CVE-2021-3156".to_string(),
                cvss3_score: 7.8,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut result = ScanResult {
            family: "redhat".to_string(),
            release: "8".to_string(),
            ..Default::default()
        };
        result.scanned_cves.insert(VulnInfo::new("CVE-2021-3156"));

        assert_eq!(fill_tracker_contents(&tracker, &mut result).await.unwrap(), 1);
        let vinfo = result.scanned_cves.get("CVE-2021-3156").unwrap();
        assert_eq!(
            vinfo.cve_contents[&CveContentType::RedHatApi].content_type,
            CveContentType::RedHatApi
        );
    }
}
