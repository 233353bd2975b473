//! Separation back-ends and their selection by tier.
//!
//! Both back-ends satisfy [`SeparationBackend`]; the job runner only ever
//! touches them through [`BackendSet::for_tier`]. The model directory is
//! passed explicitly in every [`SeparationRequest`]. The external programs
//! can only learn about it from their environment, so the child process gets
//! `TORCH_HOME` / `MODEL_PATH` pointing at it, unless the variable is already
//! set for this process, in which case the inherited value is left alone.

use crate::services::capability::CapabilityTier;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;

/// Home directory for downloaded model weights (torch hub, used by demucs)
pub const TORCH_HOME_VAR: &str = "TORCH_HOME";

/// Model search path (used by spleeter)
pub const MODEL_PATH_VAR: &str = "MODEL_PATH";

/// Environment variables pointed at the configured model directory
pub const MODEL_ENV_VARS: [&str; 2] = [TORCH_HOME_VAR, MODEL_PATH_VAR];

/// Lines of stderr kept when a back-end exits unsuccessfully
const STDERR_TAIL_LINES: usize = 10;

/// One file to separate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparationRequest {
    pub input: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub model_dir: Utf8PathBuf,
}

/// Errors from a single separation attempt
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with code {}: {stderr}", display_code(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{0}")]
    Failed(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none (terminated by signal)".to_string())
}

/// A source separation capability.
pub trait SeparationBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Separate `request.input` into stems under `request.destination`.
    ///
    /// Blocks until the back-end is done with the file.
    fn separate(&self, request: &SeparationRequest) -> Result<(), BackendError>;
}

/// Model environment hints to add for a child process.
///
/// Returns `(variable, model_dir)` for every variable in [`MODEL_ENV_VARS`]
/// that `is_set` reports as not already present.
pub fn model_env_hints<F>(model_dir: &Utf8Path, is_set: F) -> Vec<(&'static str, Utf8PathBuf)>
where
    F: Fn(&str) -> bool,
{
    MODEL_ENV_VARS
        .iter()
        .filter(|name| !is_set(name))
        .map(|name| (*name, model_dir.to_path_buf()))
        .collect()
}

fn process_env_is_set(name: &str) -> bool {
    std::env::var_os(name).is_some()
}

fn command_with_model_env(program: &str, model_dir: &Utf8Path) -> Command {
    let mut cmd = Command::new(program);
    for (name, value) in model_env_hints(model_dir, process_env_is_set) {
        cmd.env(name, value.as_str());
    }
    cmd
}

fn run_command(program: &str, mut cmd: Command) -> Result<(), BackendError> {
    tracing::debug!("Executing: {:?}", cmd);

    let output = cmd.output().map_err(|source| BackendError::Spawn {
        program: program.to_string(),
        source,
    })?;

    if output.status.success() {
        return Ok(());
    }

    Err(BackendError::Exit {
        program: program.to_string(),
        code: output.status.code(),
        stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
    })
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Low tier back-end: spleeter's 2-stem model, runs acceptably on CPU.
#[derive(Debug, Clone)]
pub struct SpleeterBackend {
    program: String,
}

impl SpleeterBackend {
    pub fn new() -> Self {
        Self::with_program("spleeter")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build_command(&self, request: &SeparationRequest) -> Command {
        let mut cmd = command_with_model_env(&self.program, &request.model_dir);
        cmd.args(["separate", "-p", "spleeter:2stems", "-o"])
            .arg(request.destination.as_str())
            .arg(request.input.as_str());
        cmd
    }
}

impl Default for SpleeterBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SeparationBackend for SpleeterBackend {
    fn name(&self) -> &'static str {
        "spleeter"
    }

    fn separate(&self, request: &SeparationRequest) -> Result<(), BackendError> {
        run_command(&self.program, self.build_command(request))
    }
}

/// High tier back-end: demucs hybrid transformer model, wants an accelerator.
#[derive(Debug, Clone)]
pub struct DemucsBackend {
    program: String,
}

impl DemucsBackend {
    pub fn new() -> Self {
        Self::with_program("demucs")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build_command(&self, request: &SeparationRequest) -> Command {
        let mut cmd = command_with_model_env(&self.program, &request.model_dir);
        cmd.args(["-n", "htdemucs", "-o"])
            .arg(request.destination.as_str())
            .arg(request.input.as_str());
        cmd
    }
}

impl Default for DemucsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SeparationBackend for DemucsBackend {
    fn name(&self) -> &'static str {
        "demucs"
    }

    fn separate(&self, request: &SeparationRequest) -> Result<(), BackendError> {
        run_command(&self.program, self.build_command(request))
    }
}

/// The pair of back-ends, one per tier.
#[derive(Clone)]
pub struct BackendSet {
    low: Arc<dyn SeparationBackend>,
    high: Arc<dyn SeparationBackend>,
}

impl BackendSet {
    pub fn new(low: Arc<dyn SeparationBackend>, high: Arc<dyn SeparationBackend>) -> Self {
        Self { low, high }
    }

    /// spleeter for the low tier, demucs for the high tier.
    pub fn external() -> Self {
        Self::new(Arc::new(SpleeterBackend::new()), Arc::new(DemucsBackend::new()))
    }

    pub fn for_tier(&self, tier: CapabilityTier) -> Arc<dyn SeparationBackend> {
        match tier {
            CapabilityTier::Low => Arc::clone(&self.low),
            CapabilityTier::High => Arc::clone(&self.high),
        }
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSet")
            .field("low", &self.low.name())
            .field("high", &self.high.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn request() -> SeparationRequest {
        SeparationRequest {
            input: Utf8PathBuf::from("/music/track.mp3"),
            destination: Utf8PathBuf::from("/tmp/out/stems/track"),
            model_dir: Utf8PathBuf::from("/opt/models"),
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_env_hints_fill_unset_variables() {
        let hints = model_env_hints(Utf8Path::new("/opt/models"), |_| false);
        assert_eq!(
            hints,
            vec![
                (TORCH_HOME_VAR, Utf8PathBuf::from("/opt/models")),
                (MODEL_PATH_VAR, Utf8PathBuf::from("/opt/models")),
            ]
        );
    }

    #[test]
    fn test_env_hints_never_override_external_values() {
        let hints = model_env_hints(Utf8Path::new("/opt/models"), |name| name == TORCH_HOME_VAR);
        assert_eq!(hints, vec![(MODEL_PATH_VAR, Utf8PathBuf::from("/opt/models"))]);

        let hints = model_env_hints(Utf8Path::new("/opt/models"), |_| true);
        assert!(hints.is_empty());
    }

    #[test]
    fn test_spleeter_command_line() {
        let cmd = SpleeterBackend::new().build_command(&request());

        assert_eq!(cmd.get_program(), OsStr::new("spleeter"));
        assert_eq!(
            args_of(&cmd),
            vec![
                "separate",
                "-p",
                "spleeter:2stems",
                "-o",
                "/tmp/out/stems/track",
                "/music/track.mp3"
            ]
        );
    }

    #[test]
    fn test_demucs_command_line() {
        let cmd = DemucsBackend::with_program("/usr/local/bin/demucs").build_command(&request());

        assert_eq!(cmd.get_program(), OsStr::new("/usr/local/bin/demucs"));
        assert_eq!(
            args_of(&cmd),
            vec!["-n", "htdemucs", "-o", "/tmp/out/stems/track", "/music/track.mp3"]
        );
    }

    #[test]
    fn test_command_env_only_contains_model_hints() {
        let cmd = DemucsBackend::new().build_command(&request());

        for (name, value) in cmd.get_envs() {
            let name = name.to_string_lossy();
            assert!(MODEL_ENV_VARS.contains(&name.as_ref()), "unexpected env var {}", name);
            assert_eq!(value, Some(OsStr::new("/opt/models")));
        }
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let backend = SpleeterBackend::with_program("stemsplit-test-no-such-spleeter");
        let result = backend.separate(&request());

        assert!(matches!(result, Err(BackendError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_exit_error() {
        let backend = DemucsBackend::with_program("false");
        let result = backend.separate(&request());

        assert!(matches!(
            result,
            Err(BackendError::Exit { code: Some(1), .. })
        ));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (1..=15).map(|i| format!("line {}\n\n", i)).collect();
        let tail = stderr_tail(&stderr);

        assert!(tail.starts_with("line 6"));
        assert!(tail.ends_with("line 15"));
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
    }

    #[test]
    fn test_backend_set_selects_by_tier() {
        let set = BackendSet::external();

        assert_eq!(set.for_tier(CapabilityTier::Low).name(), "spleeter");
        assert_eq!(set.for_tier(CapabilityTier::High).name(), "demucs");
    }
}
