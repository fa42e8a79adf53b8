//! Test data generators for stepline.
//!
//! Definition texts for the common scenarios, ready to feed to the parser.

mod dsl;

pub use dsl::*;
