//! Services module - the building blocks a batch is made of.
//!
//! Everything here is framework-agnostic: no channels, no presentation code,
//! all inputs passed explicitly.
//!
//! # Components
//!
//! - [`capability`]: accelerator probing ([`AcceleratorProbe`], [`NvidiaSmiProbe`])
//!   and the memory-to-tier policy ([`select_tier`])
//! - [`paths`]: destination derivation, `output_dir/stems/<file stem>`
//! - [`backend`]: the [`SeparationBackend`] contract, the spleeter and demucs
//!   implementations, and [`BackendSet`] for per-tier selection
//! - [`discovery`]: finding audio files in a folder
//!
//! # Usage Example
//!
//! ```ignore
//! use stemsplit::services::{paths, select_tier, BackendSet, NvidiaSmiProbe, AcceleratorProbe};
//!
//! let tier = select_tier(NvidiaSmiProbe::new().detect().capacity_gb);
//! let backend = BackendSet::external().for_tier(tier);
//! let destination = paths::resolve(input, &output_dir)?;
//! backend.separate(&SeparationRequest { input, destination, model_dir })?;
//! ```

pub mod backend;
pub mod capability;
pub mod discovery;
pub mod paths;

pub use backend::{
    BackendError, BackendSet, DemucsBackend, SeparationBackend, SeparationRequest,
    SpleeterBackend,
};
pub use capability::{
    AcceleratorInfo, AcceleratorProbe, CapabilityTier, NoAcceleratorProbe, NvidiaSmiProbe,
    select_tier,
};
pub use discovery::collect_audio_files;
pub use paths::PathError;
