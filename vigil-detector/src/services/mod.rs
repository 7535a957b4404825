//! Services Layer - Detection sources, enrichment, diff and filters

pub mod cpe;
pub mod diff;
pub mod enrichment;
pub mod filters;
pub mod github;
pub mod gost;
pub mod wordpress;

pub use cpe::detect_cpe_cves;
pub use diff::{apply_diff, diff_vulns, find_previous};
pub use enrichment::{fill_cve_details, fill_cwe_dict, fill_exploits, fill_metasploits};
pub use filters::*;
pub use github::{detect_github_cves, parse_owner_repo};
pub use gost::{detect_unfixed, fill_tracker_contents};
pub use wordpress::{compare_wp_versions, detect_wordpress_cves};
