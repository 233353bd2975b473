use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Extensions picked up when scanning a folder (compared case-insensitively)
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "flac", "ogg"];

/// Whether `path` has one of the [`AUDIO_EXTENSIONS`].
pub fn is_audio_file(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// List the audio files directly inside `dir`, sorted by path.
///
/// Subdirectories are not descended into. Entries whose names are not
/// valid UTF-8 are skipped with a warning.
pub fn collect_audio_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", dir))?;

        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(path) => {
                tracing::warn!("Skipping non UTF-8 path: {}", path.display());
                continue;
            }
        };

        if path.is_file() && is_audio_file(&path) {
            files.push(path);
        }
    }

    files.sort();
    tracing::debug!("Found {} audio file(s) in {}", files.len(), dir);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Utf8Path::new("song.mp3")));
        assert!(is_audio_file(Utf8Path::new("/a/b/Song.FLAC")));
        assert!(is_audio_file(Utf8Path::new("take.Ogg")));
        assert!(!is_audio_file(Utf8Path::new("cover.jpg")));
        assert!(!is_audio_file(Utf8Path::new("mp3")));
    }

    #[test]
    fn test_collect_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        for name in ["b.wav", "a.MP3", "notes.txt", "c.ogg"] {
            fs::write(dir.join(name), b"").unwrap();
        }
        fs::create_dir(dir.join("nested.flac")).unwrap();

        let files = collect_audio_files(&dir).unwrap();

        assert_eq!(files, vec![dir.join("a.MP3"), dir.join("b.wav"), dir.join("c.ogg")]);
    }

    #[test]
    fn test_collect_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().join("missing")).unwrap();

        assert!(collect_audio_files(&dir).is_err());
    }
}
