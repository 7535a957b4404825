//! Vigil OVAL - Matching installed packages against OVAL definitions
//!
//! This crate decides which advisory definitions affect a scanned host and
//! merges the result into the host's vulnerability records.
//!
//! # Components
//!
//! | Component | Module |
//! |-----------|--------|
//! | Version comparison per ecosystem (dpkg, apk, rpm) | [`domain::version`] |
//! | Affectedness of one package against one definition | [`services::evaluator`] |
//! | Aggregation of matched definitions | [`domain::aggregation`] |
//! | Offline and HTTP fetch strategies | [`use_cases`] |
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil_oval::DetectOvalUseCase;
//!
//! let use_case = DetectOvalUseCase::from_config(&config.oval, Some(driver))?;
//! let detected = use_case.execute(&mut scan_result).await?;
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;
pub mod use_cases;

pub use domain::*;
pub use infrastructure::*;
pub use services::*;
pub use use_cases::*;
