//! Assertion utilities for execution reports.
//!
//! Each helper returns a `Result` so tests can either `unwrap()` or inspect
//! the failure.

mod report;

pub use report::*;
