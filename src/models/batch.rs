use camino::Utf8PathBuf;

/// Lifecycle of the job runner.
///
/// `Running` is only entered with a non-empty batch and is the sole guard
/// against overlapping batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    Completed,
}

impl JobPhase {
    /// Whether a new batch may be submitted in this phase.
    pub fn accepts_submission(&self) -> bool {
        !matches!(self, JobPhase::Running)
    }
}

/// Result of processing one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Separated { destination: Utf8PathBuf },
    Failed { reason: String },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Separated { .. })
    }
}

/// Counters and log of the batch currently (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    pub log: Vec<String>,
}

impl BatchProgress {
    /// Fresh progress for a batch of `total` files.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Append a free-text line to the batch log.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    /// Count one processed file.
    pub fn record(&mut self, outcome: &FileOutcome) {
        self.completed += 1;
        if !outcome.is_success() {
            self.failed += 1;
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            succeeded: self.completed - self.failed,
            failed: self.failed,
        }
    }
}

/// Totals reported once a batch finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Human-readable one-line summary.
    pub fn describe(&self) -> String {
        if self.failed == 0 {
            format!("Processing finished: {} of {} file(s) separated", self.succeeded, self.total)
        } else {
            format!(
                "Processing finished: {} of {} file(s) separated, {} failed",
                self.succeeded, self.total, self.failed
            )
        }
    }
}

/// Everything the worker produced for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<(Utf8PathBuf, FileOutcome)>,
    pub progress: BatchProgress,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        self.progress.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phase_is_idle() {
        assert_eq!(JobPhase::default(), JobPhase::Idle);
        assert!(JobPhase::Idle.accepts_submission());
        assert!(JobPhase::Completed.accepts_submission());
        assert!(!JobPhase::Running.accepts_submission());
    }

    #[test]
    fn test_record_counts_failures() {
        let mut progress = BatchProgress::new(3);
        progress.record(&FileOutcome::Separated {
            destination: Utf8PathBuf::from("/out/stems/a"),
        });
        progress.record(&FileOutcome::Failed {
            reason: "corrupt".to_string(),
        });

        assert_eq!(progress.completed, 2);
        assert_eq!(progress.failed, 1);
        assert!(!progress.is_done());

        progress.record(&FileOutcome::Separated {
            destination: Utf8PathBuf::from("/out/stems/c"),
        });
        assert!(progress.is_done());

        let summary = progress.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_summary_description() {
        let clean = BatchSummary { total: 2, succeeded: 2, failed: 0 };
        assert_eq!(clean.describe(), "Processing finished: 2 of 2 file(s) separated");

        let partial = BatchSummary { total: 3, succeeded: 1, failed: 2 };
        assert!(partial.describe().ends_with("2 failed"));
    }
}
