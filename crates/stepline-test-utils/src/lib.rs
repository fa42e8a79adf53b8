//! Testing utilities for stepline.
//!
//! Mocks and fakes for the step service, ready-made definition texts,
//! and assertions over execution reports.

pub mod assertions;
pub mod data_generators;
pub mod implementations;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;
pub use stepline_core::session::memory::MemorySessionStore;

pub use implementations::ScriptedStepService;

/// Installs a test subscriber once. Honors `RUST_LOG`, defaults to `warn`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
