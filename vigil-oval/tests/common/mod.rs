//! Shared helpers for vigil-oval integration tests

#![allow(dead_code)]

pub mod fixtures;
