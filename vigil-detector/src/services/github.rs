//! Vulnerabilities from GitHub security alerts

use std::collections::HashMap;

use tracing::info;

use vigil_core::DetectionError;
use vigil_core::config::GitHubRepoConfig;
use vigil_core::domain::{
    Confidence, CveContent, CveContentType, GitHubAlertPackage, GitHubSecurityAlert, Reference,
    ScanResult, VulnInfo,
};

use crate::infrastructure::{GitHubAlertsClient, VulnerabilityAlert};

/// Split `owner/repo`
pub fn parse_owner_repo(owner_repo: &str) -> Result<(&str, &str), DetectionError> {
    match owner_repo.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(DetectionError::configuration(format!(
            "failed to parse GitHub repository {:?}, expected owner/repo",
            owner_repo
        ))),
    }
}

/// Collect the security alerts of every configured repository.
/// Returns the number of CVEs that were not known before.
pub async fn detect_github_cves(
    client: &GitHubAlertsClient,
    result: &mut ScanResult,
    repos: &HashMap<String, GitHubRepoConfig>,
    ignore_dismissed: bool,
) -> Result<usize, DetectionError> {
    let mut names: Vec<&String> = repos.keys().collect();
    names.sort();

    let mut new_cves = 0;
    for owner_repo in names {
        let (owner, repo) = parse_owner_repo(owner_repo)?;
        let alerts = client
            .fetch_alerts(owner, repo, &repos[owner_repo].token)
            .await?;

        let mut repo_cves = 0;
        for alert in alerts {
            if ignore_dismissed && alert.is_dismissed() {
                continue;
            }
            for vinfo in to_vuln_infos(owner_repo, &alert) {
                if result.scanned_cves.upsert(vinfo) {
                    repo_cves += 1;
                }
            }
        }
        info!(
            server = %result.server_info(),
            repository = %owner_repo,
            cves = repo_cves,
            "CVEs detected with GitHub security alerts"
        );
        new_cves += repo_cves;
    }
    Ok(new_cves)
}

fn to_vuln_infos(owner_repo: &str, alert: &VulnerabilityAlert) -> Vec<VulnInfo> {
    let advisory = &alert.security_advisory;
    let github_alert = GitHubSecurityAlert {
        repository: owner_repo.to_string(),
        package: GitHubAlertPackage {
            name: alert.security_vulnerability.package.name.clone(),
            ecosystem: alert.security_vulnerability.package.ecosystem.clone(),
            manifest_path: alert.vulnerable_manifest_path.clone(),
        },
        dismissed_at: alert.dismissed_at,
        dismiss_reason: alert.dismiss_reason.clone().unwrap_or_default(),
    };

    alert
        .cve_ids()
        .into_iter()
        .map(|cve_id| {
            let content = CveContent {
                content_type: CveContentType::GitHub,
                cve_id: cve_id.clone(),
                title: advisory.summary.clone(),
                summary: advisory.description.clone(),
                cvss3_severity: alert.security_vulnerability.severity.clone(),
                source_link: advisory.permalink.clone(),
                references: advisory
                    .references
                    .iter()
                    .map(|r| Reference {
                        source: "GitHub".to_string(),
                        link: r.url.clone(),
                        ref_id: String::new(),
                    })
                    .collect(),
                published: advisory.published_at,
                last_modified: advisory.updated_at,
                ..Default::default()
            };

            let mut vinfo = VulnInfo::new(&cve_id).with_confidence(Confidence::GITHUB_MATCH);
            vinfo.github_security_alerts.push(github_alert.clone());
            vinfo.cve_contents.insert(CveContentType::GitHub, content);
            vinfo
        })
        .collect()
}
