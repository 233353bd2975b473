//! Data models for stemsplit.
//!
//! - [`Settings`] / [`ConfigKey`]: the persisted directory preferences kept by
//!   [`ConfigStore`](crate::config::ConfigStore)
//! - [`BatchProgress`], [`BatchReport`], [`BatchSummary`], [`FileOutcome`]: what a
//!   batch produces while and after it runs
//! - [`JobPhase`]: the runner's `Idle → Running → Completed` state

pub mod batch;
pub mod config;

pub use batch::{BatchProgress, BatchReport, BatchSummary, FileOutcome, JobPhase};
pub use config::{ConfigKey, Settings, UnknownKey};
