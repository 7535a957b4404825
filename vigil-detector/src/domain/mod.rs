//! Domain Layer - Database access traits and the records they return

pub mod sources;

pub use sources::*;
