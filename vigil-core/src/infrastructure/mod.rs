//! Infrastructure Layer - Shared plumbing for remote sources

pub mod resilience;

pub use resilience::*;
