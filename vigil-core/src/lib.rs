//! Vigil Core - Foundation crate for the Vigil detection pipeline
//!
//! This crate provides the functionality shared by the OVAL engine and the
//! detection orchestrator:
//!
//! # Modules
//!
//! - [`config`] - Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] - Scan results, vulnerability records and the OS family enumeration
//! - [`application`] - Error taxonomy shared by every stage
//! - [`infrastructure`] - Retry with exponential backoff for remote sources
//! - [`logging`] - Structured logging with tracing
//!
//! # Configuration
//!
//! ```rust,ignore
//! use vigil_core::Config;
//!
//! let config = Config::load(Some("config.toml".as_ref()))?;
//! ```
//!
//! Environment variables use the `VIGIL__` prefix with double underscore separators:
//!
//! ```bash
//! VIGIL__OVAL__MODE=http
//! VIGIL__OVAL__URL=http://127.0.0.1:1324
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use application::errors::{DetectionError, FetchError, ParseError, QueryFailure, TransportError};
pub use config::Config;
pub use logging::init_tracing;
