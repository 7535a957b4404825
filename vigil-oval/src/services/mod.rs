//! Matching services

pub mod evaluator;
pub mod fill;

pub use evaluator::{Affectedness, evaluate, is_kernel_related, major};
pub use fill::{content_type_for, fill_with_oval};
