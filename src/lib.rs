//! Vigil - OVAL-driven vulnerability detection for scanned hosts
//!
//! This crate wires the workspace crates together behind the `vigil` binary.
//!
//! | Crate | Role |
//! |-------|------|
//! | [`vigil_core`] | domain model, configuration, errors, logging |
//! | [`vigil_oval`] | OVAL definition matching and fetch orchestration |
//! | [`vigil_detector`] | detection pipeline, enrichment, diff and filters |

pub mod cli;

pub use vigil_core::{Config, DetectionError, init_tracing};
pub use vigil_detector::{DetectionSources, Detector, HostOutcome, ReportRun, ResultsStore};

// Re-export for convenience
pub use vigil_core;
pub use vigil_detector;
pub use vigil_oval;
