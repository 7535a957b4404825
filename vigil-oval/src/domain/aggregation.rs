//! Aggregation of matched definitions per detection run

use std::collections::{BTreeMap, HashMap};

use vigil_core::domain::PackageFixStatus;

use super::definition::AdvisoryDefinition;

/// Fix state of one binary package under one definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixStatus {
    pub not_fixed_yet: bool,
    pub fixed_in: String,
    /// Set when the status was derived from a source package match
    pub is_src_pack: bool,
    pub src_pack_name: String,
}

impl FixStatus {
    fn specificity(&self) -> u8 {
        if !self.not_fixed_yet && !self.fixed_in.is_empty() {
            2
        } else if self.not_fixed_yet {
            1
        } else {
            0
        }
    }
}

/// A matched definition with the fix state of every binary package it affects
#[derive(Debug, Clone, PartialEq)]
pub struct DefPacks {
    pub definition: AdvisoryDefinition,
    pub binpkg_fix_status: BTreeMap<String, FixStatus>,
}

impl DefPacks {
    /// Flatten into package fix statuses sorted by package name
    pub fn to_package_statuses(&self) -> Vec<PackageFixStatus> {
        self.binpkg_fix_status
            .iter()
            .map(|(name, status)| PackageFixStatus {
                name: name.clone(),
                not_fixed_yet: status.not_fixed_yet,
                fix_state: String::new(),
                fixed_in: status.fixed_in.clone(),
            })
            .collect()
    }
}

/// Matched definitions of one detection run, at most one entry per definition id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OvalResult {
    entries: Vec<DefPacks>,
    by_id: HashMap<String, usize>,
}

impl OvalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `package_name` is affected by `definition`.
    ///
    /// Returns true when the definition was already present. Definitions
    /// without an id are never merged. A known package keeps its status when
    /// the incoming one is less specific.
    pub fn upsert(
        &mut self,
        definition: &AdvisoryDefinition,
        package_name: &str,
        status: FixStatus,
    ) -> bool {
        if !definition.definition_id.is_empty()
            && let Some(&idx) = self.by_id.get(&definition.definition_id)
        {
            let statuses = &mut self.entries[idx].binpkg_fix_status;
            match statuses.get(package_name) {
                Some(existing) if existing.specificity() > status.specificity() => {}
                _ => {
                    statuses.insert(package_name.to_string(), status);
                }
            }
            return true;
        }

        if !definition.definition_id.is_empty() {
            self.by_id
                .insert(definition.definition_id.clone(), self.entries.len());
        }
        self.entries.push(DefPacks {
            definition: definition.clone(),
            binpkg_fix_status: BTreeMap::from([(package_name.to_string(), status)]),
        });
        false
    }

    pub fn entries(&self) -> &[DefPacks] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DefPacks> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str) -> AdvisoryDefinition {
        AdvisoryDefinition {
            definition_id: id.to_string(),
            ..Default::default()
        }
    }

    fn fixed(version: &str) -> FixStatus {
        FixStatus {
            fixed_in: version.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_id_merges_packages() {
        let mut result = OvalResult::new();
        let def = definition("oval:org.debian:def:1971");
        assert!(!result.upsert(&def, "openssl", fixed("1.1.1d-0+deb10u4")));
        assert!(result.upsert(&def, "libssl1.1", fixed("1.1.1d-0+deb10u4")));

        assert_eq!(result.len(), 1);
        let names: Vec<_> = result.entries()[0]
            .to_package_statuses()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["libssl1.1", "openssl"]);
    }

    #[test]
    fn test_empty_ids_never_merge() {
        let mut result = OvalResult::new();
        let def = definition("");
        assert!(!result.upsert(&def, "musl", fixed("1.1.24-r3")));
        assert!(!result.upsert(&def, "musl", fixed("1.1.24-r3")));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_repeated_upsert_is_idempotent() {
        let mut result = OvalResult::new();
        let def = definition("oval:com.redhat.rhsa:def:20210222");
        result.upsert(&def, "sudo", fixed("1.8.29-6.el8_3.1"));
        let snapshot = result.clone();
        result.upsert(&def, "sudo", fixed("1.8.29-6.el8_3.1"));
        assert_eq!(result, snapshot);
    }

    #[test]
    fn test_upsert_keeps_more_specific_status() {
        let mut result = OvalResult::new();
        let def = definition("oval:com.redhat.rhsa:def:20210222");
        result.upsert(&def, "sudo", fixed("1.8.29-6.el8_3.1"));
        result.upsert(
            &def,
            "sudo",
            FixStatus {
                not_fixed_yet: true,
                ..Default::default()
            },
        );
        let status = &result.entries()[0].binpkg_fix_status["sudo"];
        assert!(!status.not_fixed_yet);
        assert_eq!(status.fixed_in, "1.8.29-6.el8_3.1");
    }
}
