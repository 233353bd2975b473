// State management module
//
// Holds the runner's phase and the progress of the current batch behind a
// shared lock, and turns every progress mutation into an event for the
// presentation layer.

use crate::models::{BatchProgress, BatchSummary, FileOutcome, JobPhase};
use std::cell::Cell;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::mpsc;

/// Events emitted by a running batch, in order.
///
/// Per file: one `Log` line describing the outcome, then one `Progress`.
/// After the last file: exactly one `Finished`.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchEvent {
    /// Free-text status line
    Log(String),

    /// A file has been processed (successfully or not)
    Progress {
        processed: usize,
        total: usize,
        file_label: String,
    },

    /// The batch is over
    Finished(BatchSummary),
}

/// Phase plus progress, the whole of the runner's mutable state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunnerState {
    pub phase: JobPhase,
    pub progress: BatchProgress,
}

/// Thread-safe wrapper around [`RunnerState`].
///
/// Cloning shares the same underlying state.
#[derive(Clone, Debug, Default)]
pub struct StateManager {
    state: Arc<RwLock<RunnerState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> RunnerState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunnerState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Enter `Running` for a batch of `total` files.
    ///
    /// Check and transition happen under one write lock. When a batch is
    /// already running, nothing changes and the current phase is returned.
    pub fn begin_batch(&self, total: usize) -> Result<(), JobPhase> {
        let mut state = self.write();
        if !state.phase.accepts_submission() {
            return Err(state.phase);
        }

        state.phase = JobPhase::Running;
        state.progress = BatchProgress::new(total);
        Ok(())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunnerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records progress for one batch and forwards it as [`BatchEvent`]s.
///
/// State is updated before the matching event is sent, so a consumer that
/// reacts to an event always sees at least that much progress.
///
/// Dropping a reporter that never reached [`finish`](Self::finish), for
/// example while a worker unwinds, finishes the batch with what was counted.
pub struct BatchReporter {
    state: StateManager,
    events: mpsc::UnboundedSender<BatchEvent>,
    finished: Cell<bool>,
}

impl BatchReporter {
    pub fn new(state: StateManager, events: mpsc::UnboundedSender<BatchEvent>) -> Self {
        Self {
            state,
            events,
            finished: Cell::new(false),
        }
    }

    /// Append a line to the batch log.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        self.state.write().progress.push_log(line.clone());
        self.emit(BatchEvent::Log(line));
    }

    /// Count a processed file.
    pub fn file_processed(&self, file_label: &str, outcome: &FileOutcome) {
        let (processed, total) = {
            let mut state = self.state.write();
            state.progress.record(outcome);
            (state.progress.completed, state.progress.total)
        };

        self.emit(BatchEvent::Progress {
            processed,
            total,
            file_label: file_label.to_string(),
        });
    }

    /// Move to `Completed` and send the final event.
    ///
    /// Returns the progress accumulated for the batch.
    pub fn finish(&self) -> BatchProgress {
        self.finished.set(true);
        let progress = {
            let mut state = self.state.write();
            state.phase = JobPhase::Completed;
            state.progress.clone()
        };

        self.emit(BatchEvent::Finished(progress.summary()));
        progress
    }

    fn emit(&self, event: BatchEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events.send(event);
    }
}

impl Drop for BatchReporter {
    fn drop(&mut self) {
        if !self.finished.get() {
            tracing::warn!("Batch ended before all files were reported");
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn reporter() -> (BatchReporter, StateManager, mpsc::UnboundedReceiver<BatchEvent>) {
        let state = StateManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (BatchReporter::new(state.clone(), tx), state, rx)
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.phase, JobPhase::Idle);
        assert_eq!(state.progress, BatchProgress::default());
    }

    #[test]
    fn test_begin_batch_rejects_overlap() {
        let manager = StateManager::new();

        assert!(manager.begin_batch(2).is_ok());
        assert_eq!(manager.read(|s| s.progress.total), 2);
        assert_eq!(manager.begin_batch(5), Err(JobPhase::Running));
        assert_eq!(manager.read(|s| s.progress.total), 2);
    }

    #[test]
    fn test_begin_batch_after_completion_resets_progress() {
        let (reporter, manager, _rx) = reporter();
        manager.begin_batch(1).unwrap();
        reporter.log("first batch");
        reporter.finish();

        assert!(manager.begin_batch(3).is_ok());
        let state = manager.snapshot();
        assert_eq!(state.phase, JobPhase::Running);
        assert_eq!(state.progress, BatchProgress::new(3));
    }

    #[test]
    fn test_reporter_event_sequence() {
        let (reporter, manager, mut rx) = reporter();
        manager.begin_batch(1).unwrap();

        reporter.log("Finished track.mp3");
        reporter.file_processed(
            "track.mp3",
            &FileOutcome::Separated {
                destination: Utf8PathBuf::from("/out/stems/track"),
            },
        );
        let progress = reporter.finish();

        assert_eq!(rx.try_recv().unwrap(), BatchEvent::Log("Finished track.mp3".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            BatchEvent::Progress {
                processed: 1,
                total: 1,
                file_label: "track.mp3".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BatchEvent::Finished(BatchSummary {
                total: 1,
                succeeded: 1,
                failed: 0
            })
        );
        assert!(rx.try_recv().is_err());

        assert_eq!(progress.log, vec!["Finished track.mp3".to_string()]);
        assert_eq!(manager.read(|s| s.phase), JobPhase::Completed);
    }

    #[test]
    fn test_dropped_reporter_completes_batch() {
        let (reporter, manager, mut rx) = reporter();
        manager.begin_batch(3).unwrap();

        reporter.file_processed("a.wav", &FileOutcome::Failed { reason: "boom".to_string() });
        drop(reporter);

        assert_eq!(manager.read(|s| s.phase), JobPhase::Completed);
        assert!(matches!(rx.try_recv().unwrap(), BatchEvent::Progress { processed: 1, .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            BatchEvent::Finished(BatchSummary {
                total: 3,
                succeeded: 0,
                failed: 1
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finished_reporter_sends_one_completion() {
        let (reporter, manager, mut rx) = reporter();
        manager.begin_batch(1).unwrap();

        reporter.finish();
        drop(reporter);

        assert!(matches!(rx.try_recv().unwrap(), BatchEvent::Finished(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reporter_without_listener() {
        let (reporter, manager, rx) = reporter();
        drop(rx);
        manager.begin_batch(1).unwrap();

        reporter.file_processed("a.wav", &FileOutcome::Failed { reason: "boom".to_string() });
        let progress = reporter.finish();

        assert_eq!(progress.failed, 1);
    }
}
