//! Per-package lookup requests

use vigil_core::domain::ScanResult;

/// One lookup of advisory definitions for an installed package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageQuery {
    pub package_name: String,
    /// Installed `version-release`
    pub version: String,
    /// Candidate version offered by the package manager, empty when unknown
    pub new_version: String,
    pub arch: String,
    pub is_src_pack: bool,
    /// Binaries built from this source package
    pub binary_names: Vec<String>,
    pub modularity_label: String,
}

impl PackageQuery {
    /// One query per installed binary package, then one per source package
    pub fn from_scan_result(result: &ScanResult) -> Vec<PackageQuery> {
        let binaries = result.packages.values().map(|pack| PackageQuery {
            package_name: pack.name.clone(),
            version: pack.format_ver(),
            new_version: pack.format_new_ver(),
            arch: pack.arch.clone(),
            is_src_pack: false,
            binary_names: Vec::new(),
            modularity_label: pack.modularity_label.clone(),
        });
        let sources = result.src_packages.values().map(|pack| PackageQuery {
            package_name: pack.name.clone(),
            version: pack.version.clone(),
            new_version: String::new(),
            arch: pack.arch.clone(),
            is_src_pack: true,
            binary_names: pack.binary_names.clone(),
            modularity_label: String::new(),
        });
        binaries.chain(sources).collect()
    }
}
