//! Mock implementations of stepline's service seams.

pub mod step_service;

pub use step_service::*;
