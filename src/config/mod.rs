use crate::models::{ConfigKey, Settings};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Directory name used under the platform config/data locations
pub const APP_DIR_NAME: &str = "stemsplit";

/// File name of the persisted settings
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Errors surfaced by [`ConfigStore`] operations.
///
/// A corrupt or unreadable settings file is not one of them: that case is
/// reported through [`LoadOutcome::Recovered`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How [`ConfigStore::load`] obtained its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Persisted values were overlaid onto the current settings
    Loaded,
    /// No file existed; the current settings were written as the initial file
    Created,
    /// The file could not be used; current settings were kept as they were
    Recovered { reason: String },
}

/// Well-known locations for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_file: Utf8PathBuf,
    pub model_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
}

impl AppPaths {
    /// Resolve paths under the platform config and data directories.
    ///
    /// Falls back to the current directory when a platform location is
    /// unknown or not valid UTF-8.
    pub fn platform() -> Self {
        let config_root = platform_dir(dirs::config_dir());
        let data_root = platform_dir(dirs::data_dir());
        Self::under(&config_root, &data_root)
    }

    /// Lay out all paths below explicit roots.
    pub fn under(config_root: &Utf8Path, data_root: &Utf8Path) -> Self {
        let data_dir = data_root.join(APP_DIR_NAME);
        Self {
            config_file: config_root.join(APP_DIR_NAME).join(CONFIG_FILE_NAME),
            model_dir: data_dir.join("models"),
            output_dir: data_dir.join("output"),
            log_dir: data_dir.join("logs"),
        }
    }

    /// Built-in settings for this layout.
    pub fn default_settings(&self) -> Settings {
        Settings::new(self.model_dir.clone(), self.output_dir.clone())
    }
}

fn platform_dir(dir: Option<std::path::PathBuf>) -> Utf8PathBuf {
    dir.and_then(|d| Utf8PathBuf::from_path_buf(d).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}

/// Durable store for the directory preferences.
///
/// Every mutation is written through to disk before it becomes visible in
/// memory. Share one instance per process behind an `Arc`; readers that need
/// stable values for a longer operation should take a [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub struct ConfigStore {
    path: Utf8PathBuf,
    settings: RwLock<Settings>,
}

impl ConfigStore {
    /// Open the store backed by `path`, starting from `defaults`.
    ///
    /// Loads the persisted file (writing it if absent) and makes sure both
    /// configured directories exist.
    pub fn open<P: AsRef<Utf8Path>>(path: P, defaults: Settings) -> Result<Self, ConfigError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            settings: RwLock::new(defaults),
        };

        let outcome = store.load()?;
        tracing::debug!("Config load outcome for {}: {:?}", store.path, outcome);

        let settings = store.snapshot();
        for key in ConfigKey::ALL {
            create_dir(settings.get(key))?;
        }

        tracing::info!(
            "Config ready: model_dir={}, output_dir={}",
            settings.model_dir,
            settings.output_dir
        );
        Ok(store)
    }

    /// Open the store at the platform location with platform defaults.
    pub fn open_default() -> Result<Self, ConfigError> {
        let paths = AppPaths::platform();
        Self::open(&paths.config_file, paths.default_settings())
    }

    /// Read the persisted file and overlay it onto the current settings.
    pub fn load(&self) -> Result<LoadOutcome, ConfigError> {
        if !self.path.exists() {
            tracing::info!("Config file not found at {}, writing defaults", self.path);
            self.save()?;
            return Ok(LoadOutcome::Created);
        }

        let object = match read_object(&self.path) {
            Ok(object) => object,
            Err(reason) => {
                tracing::warn!("Ignoring config file {}: {}", self.path, reason);
                return Ok(LoadOutcome::Recovered { reason });
            }
        };

        let ignored = self.write().merge_json(object);
        for key in ignored {
            tracing::warn!("Ignoring non-string value for '{}' in {}", key, self.path);
        }

        tracing::info!("Loaded config from {}", self.path);
        Ok(LoadOutcome::Loaded)
    }

    /// Write the full settings to the backing file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let settings = self.read();
        write_settings(&self.path, &settings)
    }

    /// Current value of `key`.
    pub fn get(&self, key: ConfigKey) -> Utf8PathBuf {
        self.read().get(key).clone()
    }

    /// Create `value` as a directory and persist it under `key`.
    ///
    /// Nothing changes, in memory or on disk, unless both the directory
    /// creation and the file write succeed.
    pub fn set(&self, key: ConfigKey, value: impl Into<Utf8PathBuf>) -> Result<(), ConfigError> {
        let value = value.into();
        create_dir(&value)?;

        let mut settings = self.write();
        let mut candidate = settings.clone();
        candidate.set(key, value);
        write_settings(&self.path, &candidate)?;
        *settings = candidate;

        tracing::info!("Config updated: {}={}", key, settings.get(key));
        Ok(())
    }

    pub fn model_dir(&self) -> Utf8PathBuf {
        self.get(ConfigKey::ModelDir)
    }

    pub fn output_dir(&self) -> Utf8PathBuf {
        self.get(ConfigKey::OutputDir)
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn create_dir(path: &Utf8Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn read_object(path: &Utf8Path) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("read failed: {}", e))?;
    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| format!("parse failed: {}", e))?;
    match value {
        serde_json::Value::Object(object) => Ok(object),
        other => Err(format!("expected a JSON object, found {}", json_kind(&other))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn write_settings(path: &Utf8Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        create_dir(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("Saved config to {}", path);
    Ok(())
}
