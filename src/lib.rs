// stemsplit - batch audio stem separation
//
// This is the library crate containing configuration, capability probing,
// back-end invocation and the background job runner.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod runner;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{AppPaths, ConfigError, ConfigStore, LoadOutcome};
pub use models::{BatchProgress, BatchReport, BatchSummary, ConfigKey, FileOutcome, JobPhase, Settings};
pub use runner::{BatchHandle, JobRunner, SubmitError};
pub use state::{BatchEvent, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
