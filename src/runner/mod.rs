//! Sequential background execution of a batch.
//!
//! [`JobRunner::submit`] takes a non-empty, ordered list of files, snapshots
//! the configuration, and hands the batch to a worker on tokio's blocking
//! pool. The worker:
//!
//! 1. queries the accelerator probe once and picks the back-end for the tier;
//! 2. for each file, in submission order, resolves the destination and runs
//!    the back-end;
//! 3. reports a log line and a progress event per file whatever the outcome;
//! 4. marks the runner `Completed` and sends a single `Finished` event.
//!
//! A failing file never stops the batch. There is no cancellation: once
//! submitted, a batch runs to its end.

use crate::config::ConfigStore;
use crate::models::{BatchProgress, BatchReport, FileOutcome, JobPhase, Settings};
use crate::services::backend::{BackendSet, SeparationBackend, SeparationRequest};
use crate::services::capability::{AcceleratorInfo, AcceleratorProbe, select_tier};
use crate::services::paths;
use crate::state::{BatchEvent, BatchReporter, StateManager};
use camino::{Utf8Path, Utf8PathBuf};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

/// Reasons a submission is turned away. Neither changes the runner's state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("No files to process")]
    EmptyBatch,

    #[error("A batch is already running")]
    AlreadyRunning,
}

/// Runs batches, one at a time.
pub struct JobRunner {
    config: Arc<ConfigStore>,
    probe: Arc<dyn AcceleratorProbe>,
    backends: BackendSet,
    runtime: Handle,
    state: StateManager,
}

impl JobRunner {
    /// Create a runner.
    ///
    /// # Arguments
    /// * `config` - Shared configuration, read once per batch
    /// * `probe` - Accelerator query, called once per batch
    /// * `backends` - Back-ends selectable by tier
    /// * `runtime` - Handle to the tokio runtime that hosts batch workers
    pub fn new(
        config: Arc<ConfigStore>,
        probe: Arc<dyn AcceleratorProbe>,
        backends: BackendSet,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            probe,
            backends,
            runtime,
            state: StateManager::new(),
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.state.read(|s| s.phase)
    }

    /// Progress of the running (or last finished) batch.
    pub fn progress(&self) -> BatchProgress {
        self.state.read(|s| s.progress.clone())
    }

    /// Start processing `files` in the background.
    ///
    /// Returns immediately. Rejected without side effects when `files` is
    /// empty or another batch is still running.
    pub fn submit(&self, files: Vec<Utf8PathBuf>) -> Result<BatchHandle, SubmitError> {
        if files.is_empty() {
            tracing::warn!("Rejected empty batch");
            return Err(SubmitError::EmptyBatch);
        }

        if self.state.begin_batch(files.len()).is_err() {
            tracing::warn!("Rejected batch of {} file(s): a batch is already running", files.len());
            return Err(SubmitError::AlreadyRunning);
        }

        let settings = self.config.snapshot();
        tracing::info!(
            "Starting batch of {} file(s), output_dir={}, model_dir={}",
            files.len(),
            settings.output_dir,
            settings.model_dir
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let worker = BatchWorker {
            files,
            settings,
            probe: Arc::clone(&self.probe),
            backends: self.backends.clone(),
            reporter: BatchReporter::new(self.state.clone(), events_tx),
        };

        let join = self.runtime.spawn_blocking(move || worker.run());

        Ok(BatchHandle {
            events: events_rx,
            join,
        })
    }
}

/// Receiving end of a submitted batch.
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    join: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Next event, or `None` once the batch is over and all events were read.
    pub async fn recv(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Wait for the worker and return its report.
    ///
    /// Unread events are discarded.
    pub async fn wait(self) -> Result<BatchReport, JoinError> {
        self.join.await
    }

    /// Read every event until the batch ends, then return them with the report.
    pub async fn collect(mut self) -> Result<(Vec<BatchEvent>, BatchReport), JoinError> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let report = self.join.await?;
        Ok((events, report))
    }
}

/// Everything one batch needs, moved onto the blocking pool.
struct BatchWorker {
    files: Vec<Utf8PathBuf>,
    settings: Settings,
    probe: Arc<dyn AcceleratorProbe>,
    backends: BackendSet,
    reporter: BatchReporter,
}

impl BatchWorker {
    fn run(self) -> BatchReport {
        let accelerator = match catch_unwind(AssertUnwindSafe(|| self.probe.detect())) {
            Ok(info) => info,
            Err(_) => {
                tracing::warn!("Accelerator probe panicked, assuming no accelerator");
                AcceleratorInfo::absent()
            }
        };
        let tier = select_tier(accelerator.capacity_gb);
        let backend = self.backends.for_tier(tier);

        tracing::info!(
            "Selected {} backend: tier={}, accelerator={}, capacity={:.2} GB",
            backend.name(),
            tier,
            accelerator.available,
            accelerator.capacity_gb
        );
        self.reporter.log(format!(
            "Using {} backend ({} tier, {:.2} GB accelerator memory)",
            backend.name(),
            tier,
            accelerator.capacity_gb
        ));

        let total = self.files.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, input) in self.files.iter().enumerate() {
            let label = paths::file_label(input);
            tracing::info!("Processing file {}/{}: {}", index + 1, total, input);

            let outcome = self.process_file(input, backend.as_ref());
            match &outcome {
                FileOutcome::Separated { destination } => {
                    tracing::info!("File {} separated into {}", input, destination);
                    self.reporter.log(format!("Finished {} -> {}", label, destination));
                }
                FileOutcome::Failed { reason } => {
                    tracing::error!("File {} failed: {}", input, reason);
                    self.reporter.log(format!("Failed {}: {}", label, reason));
                }
            }

            self.reporter.file_processed(&label, &outcome);
            outcomes.push((input.clone(), outcome));
        }

        let progress = self.reporter.finish();
        tracing::info!("Batch finished: {}", progress.summary().describe());

        BatchReport { outcomes, progress }
    }

    fn process_file(&self, input: &Utf8Path, backend: &dyn SeparationBackend) -> FileOutcome {
        let destination = match paths::resolve(input, &self.settings.output_dir) {
            Ok(destination) => destination,
            Err(e) => {
                return FileOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let request = SeparationRequest {
            input: input.to_path_buf(),
            destination,
            model_dir: self.settings.model_dir.clone(),
        };

        // A panicking back-end must not leave the runner stuck in Running
        match catch_unwind(AssertUnwindSafe(|| backend.separate(&request))) {
            Ok(Ok(())) => FileOutcome::Separated {
                destination: request.destination,
            },
            Ok(Err(e)) => FileOutcome::Failed {
                reason: e.to_string(),
            },
            Err(_) => FileOutcome::Failed {
                reason: format!("{} backend panicked", backend.name()),
            },
        }
    }
}
