//! Accelerator detection and back-end tier selection.
//!
//! The probe answers a single question, whether a compute accelerator is
//! present and how much memory it has, and [`select_tier`] turns the memory
//! figure into a [`CapabilityTier`]. Missing hardware or drivers is a normal
//! answer (`available = false`, `capacity_gb = 0.0`), never an error.

use regex::Regex;
use std::fmt;
use std::process::Command;

/// Accelerator memory (GB) at which the high tier back-end is used.
pub const HIGH_TIER_MIN_GB: f64 = 4.0;

/// Coarse capability class used to pick a separation back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityTier {
    Low,
    High,
}

impl CapabilityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityTier::Low => "low",
            CapabilityTier::High => "high",
        }
    }
}

impl fmt::Display for CapabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map accelerator memory to a tier.
///
/// Strictly below [`HIGH_TIER_MIN_GB`] is `Low`, anything at or above it is
/// `High`. A NaN reading compares false and lands in `Low`.
pub fn select_tier(capacity_gb: f64) -> CapabilityTier {
    if capacity_gb >= HIGH_TIER_MIN_GB {
        CapabilityTier::High
    } else {
        CapabilityTier::Low
    }
}

/// Answer of a single accelerator query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceleratorInfo {
    pub available: bool,
    pub capacity_gb: f64,
}

impl AcceleratorInfo {
    /// No accelerator present.
    pub fn absent() -> Self {
        Self {
            available: false,
            capacity_gb: 0.0,
        }
    }

    /// An accelerator with `capacity_gb` of memory.
    pub fn with_capacity_gb(capacity_gb: f64) -> Self {
        Self {
            available: true,
            capacity_gb,
        }
    }

    pub fn tier(&self) -> CapabilityTier {
        select_tier(self.capacity_gb)
    }
}

/// Source of accelerator information.
pub trait AcceleratorProbe: Send + Sync {
    /// Query accelerator presence and memory. Must not fail.
    fn detect(&self) -> AcceleratorInfo;
}

/// Probe backed by `nvidia-smi`.
///
/// Reads the total memory of the first listed device. Any problem running
/// the tool or reading its output is reported as no accelerator.
pub struct NvidiaSmiProbe {
    program: String,

    /// Matches the leading MiB figure of a `--format=csv,noheader,nounits` line
    memory_pattern: Regex,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self::with_program("nvidia-smi")
    }

    /// Use a different executable name or path for the query.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            memory_pattern: Regex::new(r"^\s*(\d+(?:\.\d+)?)").expect("Invalid memory regex"),
        }
    }

    /// Memory of the first device in MiB, if the output has one.
    pub fn parse_memory_mib(&self, stdout: &str) -> Option<f64> {
        let first = stdout.lines().find(|line| !line.trim().is_empty())?;
        let captures = self.memory_pattern.captures(first)?;
        captures.get(1)?.as_str().parse().ok()
    }

    fn query(&self) -> Result<f64, String> {
        let output = Command::new(&self.program)
            .args(["--query-gpu=memory.total", "--format=csv,noheader,nounits"])
            .output()
            .map_err(|e| format!("failed to run {}: {}", self.program, e))?;

        if !output.status.success() {
            return Err(format!("{} exited with {}", self.program, output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.parse_memory_mib(&stdout)
            .ok_or_else(|| format!("unrecognized {} output: {:?}", self.program, stdout.trim()))
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorProbe for NvidiaSmiProbe {
    fn detect(&self) -> AcceleratorInfo {
        match self.query() {
            Ok(memory_mib) => {
                let info = AcceleratorInfo::with_capacity_gb(memory_mib / 1024.0);
                tracing::info!("Detected accelerator with {:.2} GB memory", info.capacity_gb);
                info
            }
            Err(reason) => {
                tracing::debug!("No accelerator detected: {}", reason);
                AcceleratorInfo::absent()
            }
        }
    }
}

/// Probe that always reports no accelerator (forced CPU mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAcceleratorProbe;

impl AcceleratorProbe for NoAcceleratorProbe {
    fn detect(&self) -> AcceleratorInfo {
        AcceleratorInfo::absent()
    }
}
