//! Shared helpers for vigil-detector integration tests

#![allow(dead_code)]

pub mod fixtures;
