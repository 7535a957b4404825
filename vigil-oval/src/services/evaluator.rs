//! Affectedness of an installed package against one definition

use tracing::debug;

use vigil_core::domain::{Family, Kernel};

use crate::domain::{AdvisoryDefinition, AffectedPack, PackageQuery, VersionGrammar};

/// Outcome of evaluating one definition for one package query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affectedness {
    pub affected: bool,
    pub not_fixed_yet: bool,
    pub fixed_in: String,
}

impl Affectedness {
    fn affected(not_fixed_yet: bool, fixed_in: &str) -> Self {
        Self {
            affected: true,
            not_fixed_yet,
            fixed_in: fixed_in.to_string(),
        }
    }
}

/// Kernel packages whose advisories only apply to the running kernel's major line
const KERNEL_RELATED_PACKAGES: &[&str] = &[
    "kernel",
    "kernel-aarch64",
    "kernel-abi-whitelists",
    "kernel-bootwrapper",
    "kernel-debug",
    "kernel-debug-devel",
    "kernel-devel",
    "kernel-doc",
    "kernel-headers",
    "kernel-kdump",
    "kernel-kdump-devel",
    "kernel-rt",
    "kernel-rt-debug",
    "kernel-rt-debug-devel",
    "kernel-rt-debug-kvm",
    "kernel-rt-devel",
    "kernel-rt-doc",
    "kernel-rt-kvm",
    "kernel-rt-trace",
    "kernel-rt-trace-devel",
    "kernel-rt-trace-kvm",
    "kernel-rt-virt",
    "kernel-rt-virt-devel",
    "kernel-tools",
    "kernel-tools-libs",
    "kernel-tools-libs-devel",
    "kernel-uek",
    "perf",
    "python-perf",
];

pub fn is_kernel_related(name: &str) -> bool {
    KERNEL_RELATED_PACKAGES.contains(&name)
}

/// Major version: the part before the first `.`, ignoring any epoch
pub fn major(version: &str) -> &str {
    let without_epoch = version.split_once(':').map_or(version, |(_, rest)| rest);
    without_epoch
        .split_once('.')
        .map_or(without_epoch, |(major, _)| major)
}

/// Families whose feed states the fixed version authoritatively
fn trusts_feed_fix_state(family: Family) -> bool {
    family.is_debian_family()
        || matches!(
            family,
            Family::RedHat | Family::Amazon | Family::SuseEnterpriseServer
        )
}

/// Decide whether `query` is affected by `definition`. The first matching
/// affected-package record decides.
pub fn evaluate(
    definition: &AdvisoryDefinition,
    query: &PackageQuery,
    family: Family,
    running_kernel: &Kernel,
    enabled_modules: &[String],
) -> Affectedness {
    let mut outcome = evaluate_records(definition, query, family, running_kernel, enabled_modules);
    if outcome.not_fixed_yet && outcome.fixed_in == query.version {
        outcome.fixed_in.clear();
    }
    outcome
}

fn evaluate_records(
    definition: &AdvisoryDefinition,
    query: &PackageQuery,
    family: Family,
    running_kernel: &Kernel,
    enabled_modules: &[String],
) -> Affectedness {
    for pack in &definition.affected_packs {
        if pack.name != query.package_name {
            continue;
        }

        if !pack.modularity_label.is_empty()
            && !enabled_modules.iter().any(|m| *m == pack.modularity_label)
        {
            continue;
        }

        if !running_kernel.release.is_empty()
            && family.is_redhat_like()
            && is_kernel_related(&pack.name)
            && major(&pack.version) != major(&running_kernel.release)
        {
            continue;
        }

        if pack.not_fixed_yet {
            return Affectedness::affected(true, &pack.version);
        }

        let Some(less) = less_than(family, &query.version, pack, definition) else {
            return Affectedness::default();
        };
        if !less {
            continue;
        }

        if query.is_src_pack || trusts_feed_fix_state(family) {
            return Affectedness::affected(false, &pack.version);
        }

        // CentOS, Oracle and Alpine: the feed's fixed state does not tell
        // whether the host can already install the fix.
        if query.new_version.is_empty() {
            return Affectedness::affected(true, &pack.version);
        }
        let Some(candidate_less) = less_than(family, &query.new_version, pack, definition) else {
            return Affectedness::default();
        };
        return Affectedness::affected(candidate_less, &pack.version);
    }
    Affectedness::default()
}

/// `None` when either version does not parse under the family grammar
fn less_than(
    family: Family,
    installed: &str,
    pack: &AffectedPack,
    definition: &AdvisoryDefinition,
) -> Option<bool> {
    let result = VersionGrammar::for_family(family)
        .map_err(|e| e.to_string())
        .and_then(|grammar| {
            grammar
                .less_than(installed, &pack.version)
                .map_err(|e| e.to_string())
        });
    match result {
        Ok(less) => Some(less),
        Err(error) => {
            debug!(
                definition_id = %definition.definition_id,
                package = %pack.name,
                installed = %installed,
                oval_version = %pack.version,
                %error,
                "Failed to compare versions"
            );
            None
        }
    }
}
