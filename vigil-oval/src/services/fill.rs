//! Merging matched definitions into a scan result

use once_cell::sync::Lazy;
use regex::Regex;

use vigil_core::domain::{
    Confidence, CveContent, CveContentType, DistroAdvisory, Family, Reference, ScanResult,
    VulnInfo,
};

use crate::domain::{AdvisoryCve, AdvisoryDefinition, DefPacks, OvalResult};

static CWE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"CWE-\d+").expect("static regex is valid"));

/// Content source under which a family's OVAL data is recorded
pub fn content_type_for(family: Family) -> Option<CveContentType> {
    match family {
        Family::Debian | Family::Raspbian => Some(CveContentType::Debian),
        Family::Ubuntu => Some(CveContentType::Ubuntu),
        Family::RedHat | Family::CentOS => Some(CveContentType::RedHat),
        Family::Oracle => Some(CveContentType::Oracle),
        Family::Amazon => Some(CveContentType::Amazon),
        Family::SuseEnterpriseServer => Some(CveContentType::Suse),
        Family::Alpine => Some(CveContentType::Alpine),
        Family::FreeBsd | Family::Windows | Family::Pseudo => None,
    }
}

fn source_link(content_type: CveContentType, cve_id: &str) -> String {
    match content_type {
        CveContentType::RedHat => format!("https://access.redhat.com/security/cve/{cve_id}"),
        CveContentType::Debian => format!("https://security-tracker.debian.org/tracker/{cve_id}"),
        CveContentType::Ubuntu => {
            format!("http://people.ubuntu.com/~ubuntu-security/cve/{cve_id}")
        }
        CveContentType::Oracle => format!("https://linux.oracle.com/cve/{cve_id}.html"),
        _ => String::new(),
    }
}

/// Split `7.8/CVSS:3.1/AV:L/...` into score and vector
fn split_cvss(raw: &str) -> (f64, String) {
    match raw.split_once('/') {
        Some((score, vector)) => (score.trim().parse().unwrap_or(0.0), vector.to_string()),
        None => (raw.trim().parse().unwrap_or(0.0), String::new()),
    }
}

fn advisory_id(definition: &AdvisoryDefinition) -> Option<String> {
    let first = definition.title.split_whitespace().next()?;
    let id = first.trim_end_matches(':');
    ["RHSA-", "RHBA-", "RHEA-", "ELSA-", "ALAS"]
        .iter()
        .any(|prefix| id.starts_with(prefix))
        .then(|| id.to_string())
}

fn to_content(
    content_type: CveContentType,
    cve_id: &str,
    definition: &AdvisoryDefinition,
    cve: Option<&AdvisoryCve>,
) -> CveContent {
    let mut content = CveContent {
        content_type,
        cve_id: cve_id.to_string(),
        title: definition.title.clone(),
        summary: definition.description.clone(),
        source_link: source_link(content_type, cve_id),
        references: definition
            .references
            .iter()
            .map(|r| Reference {
                source: r.source.clone(),
                link: r.ref_url.clone(),
                ref_id: r.ref_id.clone(),
            })
            .collect(),
        published: definition.advisory.issued,
        last_modified: definition.advisory.updated,
        ..Default::default()
    };

    if let Some(cve) = cve {
        let severity = if cve.impact.is_empty() {
            definition.advisory.severity.clone()
        } else {
            cve.impact.clone()
        };
        (content.cvss2_score, content.cvss2_vector) = split_cvss(&cve.cvss2);
        (content.cvss3_score, content.cvss3_vector) = split_cvss(&cve.cvss3);
        if !cve.cvss2.is_empty() {
            content.cvss2_severity = severity.clone();
        }
        content.cvss3_severity = severity;
        content.cwe_ids = CWE_ID
            .find_iter(&cve.cwe)
            .map(|m| m.as_str().to_string())
            .collect();
        if !cve.href.is_empty() {
            content.source_link = cve.href.clone();
        }
    } else {
        content.cvss3_severity = definition.advisory.severity.clone();
    }
    content
}

fn to_vuln_infos(family: Family, def_packs: &DefPacks) -> Vec<VulnInfo> {
    let definition = &def_packs.definition;
    let content_type = content_type_for(family);
    let advisory = matches!(
        family,
        Family::RedHat | Family::CentOS | Family::Oracle | Family::Amazon
    )
    .then(|| advisory_id(definition))
    .flatten()
    .map(|advisory_id| DistroAdvisory {
        advisory_id,
        severity: definition.advisory.severity.clone(),
        issued: definition.advisory.issued,
        updated: definition.advisory.updated,
        description: definition.description.clone(),
    });

    definition
        .cve_ids()
        .into_iter()
        .map(|cve_id| {
            let mut vinfo = VulnInfo::new(&cve_id).with_confidence(Confidence::OVAL_MATCH);
            for status in def_packs.to_package_statuses() {
                vinfo.upsert_affected_package(status);
            }
            if let Some(content_type) = content_type {
                let content =
                    to_content(content_type, &cve_id, definition, definition.advisory_cve(&cve_id));
                vinfo.cve_contents.insert(content_type, content);
            }
            if let Some(advisory) = &advisory {
                vinfo.distro_advisories.push(advisory.clone());
            }
            vinfo
        })
        .collect()
}

/// Merge every matched definition into `result.scanned_cves`.
/// Returns the number of CVE identifiers that were not known before.
pub fn fill_with_oval(result: &mut ScanResult, family: Family, oval: &OvalResult) -> usize {
    let mut new_cves = 0;
    for def_packs in oval.entries() {
        for vinfo in to_vuln_infos(family, def_packs) {
            if result.scanned_cves.upsert(vinfo) {
                new_cves += 1;
            }
        }
    }
    new_cves
}
