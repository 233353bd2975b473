use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// Subdirectory of the output root that holds per-file destinations
pub const STEMS_DIR_NAME: &str = "stems";

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Input path has no file name: {0}")]
    NoFileStem(Utf8PathBuf),

    #[error("Failed to create destination {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination directory for `input` below `output_root`.
///
/// `output_root/stems/<file stem>`. Pure path arithmetic; two inputs with the
/// same stem map to the same directory.
pub fn destination_for(
    input: &Utf8Path,
    output_root: &Utf8Path,
) -> Result<Utf8PathBuf, PathError> {
    let stem = input
        .file_stem()
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| PathError::NoFileStem(input.to_path_buf()))?;

    Ok(output_root.join(STEMS_DIR_NAME).join(stem))
}

/// Compute and create the destination directory for `input`.
///
/// Safe to repeat: an existing directory is reused as-is.
pub fn resolve(input: &Utf8Path, output_root: &Utf8Path) -> Result<Utf8PathBuf, PathError> {
    let destination = destination_for(input, output_root)?;

    fs::create_dir_all(&destination).map_err(|source| PathError::CreateDir {
        path: destination.clone(),
        source,
    })?;

    tracing::debug!("Resolved destination for {}: {}", input, destination);
    Ok(destination)
}

/// Label shown for `input` in progress reports: its file name.
pub fn file_label(input: &Utf8Path) -> String {
    input
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| input.to_string())
}
