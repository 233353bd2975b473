use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Persisted user settings from `config.json`.
///
/// Only the two directory keys are interpreted. Anything else found in the
/// file is carried in `extra` and written back untouched on the next save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Home directory for separation model weights
    pub model_dir: Utf8PathBuf,

    /// Root under which `stems/<name>/` destinations are created
    pub output_dir: Utf8PathBuf,

    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Settings {
    /// Build settings with the given directories and no extra keys.
    pub fn new(model_dir: impl Into<Utf8PathBuf>, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            output_dir: output_dir.into(),
            extra: IndexMap::new(),
        }
    }

    /// Get the directory stored under `key`.
    pub fn get(&self, key: ConfigKey) -> &Utf8PathBuf {
        match key {
            ConfigKey::ModelDir => &self.model_dir,
            ConfigKey::OutputDir => &self.output_dir,
        }
    }

    /// Replace the directory stored under `key`.
    pub fn set(&mut self, key: ConfigKey, value: Utf8PathBuf) {
        match key {
            ConfigKey::ModelDir => self.model_dir = value,
            ConfigKey::OutputDir => self.output_dir = value,
        }
    }

    /// Overlay the members of a persisted JSON object onto these settings.
    ///
    /// Recognized keys win only when their value is a string; the rest of the
    /// object lands in `extra`. Returns the recognized keys that were skipped
    /// because of their type.
    pub fn merge_json(&mut self, object: serde_json::Map<String, serde_json::Value>) -> Vec<String> {
        let mut ignored = Vec::new();

        for (name, value) in object {
            match name.parse::<ConfigKey>() {
                Ok(key) => match value {
                    serde_json::Value::String(path) => self.set(key, Utf8PathBuf::from(path)),
                    _ => ignored.push(name),
                },
                Err(_) => {
                    self.extra.insert(name, value);
                }
            }
        }

        ignored
    }
}

/// Directory-valued configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ModelDir,
    OutputDir,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 2] = [ConfigKey::ModelDir, ConfigKey::OutputDir];

    /// Name of the key in `config.json`
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::ModelDir => "model_dir",
            ConfigKey::OutputDir => "output_dir",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown configuration key: {0}")]
pub struct UnknownKey(pub String);

impl FromStr for ConfigKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_dir" => Ok(ConfigKey::ModelDir),
            "output_dir" => Ok(ConfigKey::OutputDir),
            other => Err(UnknownKey(other.to_string())),
        }
    }
}
