//! Test data fixtures for vigil-oval

use std::time::Duration;

use vigil_core::domain::{Family, Kernel};
use vigil_core::infrastructure::RetryConfig;
use vigil_oval::{
    Advisory, AdvisoryCve, AdvisoryDefinition, AffectedPack, FetchContext, PackageQuery,
};

/// Retry policy with millisecond delays
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

/// Definition fixing `package` in `version` for one CVE
pub fn definition(id: &str, cve_id: &str, package: &str, version: &str) -> AdvisoryDefinition {
    AdvisoryDefinition {
        definition_id: id.to_string(),
        title: cve_id.to_string(),
        advisory: Advisory {
            cves: vec![AdvisoryCve {
                cve_id: cve_id.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        },
        affected_packs: vec![AffectedPack {
            name: package.to_string(),
            version: version.to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn binary_query(name: &str, version: &str) -> PackageQuery {
    PackageQuery {
        package_name: name.to_string(),
        version: version.to_string(),
        ..Default::default()
    }
}

pub fn context(family: Family, oval_family: Family, release: &str) -> FetchContext {
    FetchContext {
        family,
        oval_family,
        release: release.to_string(),
        running_kernel: Kernel::default(),
        enabled_modules: Vec::new(),
    }
}
