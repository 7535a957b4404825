//! Application Layer - The per-host detection pipeline

pub mod pipeline;

pub use pipeline::*;
