//! Infrastructure Layer - Snapshot database, remote APIs and result files

pub mod dependency_check;
pub mod github;
pub mod results_store;
pub mod snapshot;
pub mod wpscan;

pub use dependency_check::{parse_cpe_names, read_cpe_names};
pub use github::*;
pub use results_store::*;
pub use snapshot::*;
pub use wpscan::*;
