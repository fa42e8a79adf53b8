//! Test implementations (fakes) of stepline's service seams.
//!
//! Higher fidelity than the mocks: they keep state across calls and record
//! everything they were sent.

pub mod scripted_service;

pub use scripted_service::*;
