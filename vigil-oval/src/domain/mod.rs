//! Domain Layer - Definitions, queries, version grammars and aggregation

pub mod aggregation;
pub mod definition;
pub mod query;
pub mod version;

pub use aggregation::*;
pub use definition::*;
pub use query::*;
pub use version::{VersionGrammar, compare, normalize_centos};
