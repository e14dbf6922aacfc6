//! Shared helpers for integration tests.
//!
//! Tests run against a real SQLite catalog in a temporary directory and the
//! deterministic fixture provider, optionally wrapped to inject failures.

#![allow(dead_code)]
#![allow(unused_imports)]

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::*;
