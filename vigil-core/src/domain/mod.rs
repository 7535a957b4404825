//! Domain Layer - Scan results and vulnerability records
//!
//! This module contains the entities and value objects every detection
//! stage reads and extends.

pub mod family;
pub mod scan;
pub mod vulnerability;

pub use family::*;
pub use scan::*;
pub use vulnerability::*;
