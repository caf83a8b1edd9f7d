use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::settings::types::GrabberSettings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent grabber settings backed by a JSON file.
pub struct SettingsStore {
    path: PathBuf,
    data: Mutex<GrabberSettings>,
    is_dirty: AtomicBool,
}

impl SettingsStore {
    /// Create a new store, loading from disk if the file exists.
    ///
    /// An unreadable or corrupt file is logged and replaced by defaults.
    pub fn new(path: PathBuf) -> Self {
        let data = Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring settings at {}: {e}", path.display());
            GrabberSettings::default()
        });
        Self {
            path,
            data: Mutex::new(data),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Load settings from a JSON file, returning default on missing file.
    pub fn load(path: &Path) -> Result<GrabberSettings, SettingsError> {
        if !path.exists() {
            return Ok(GrabberSettings::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save current settings to disk atomically (write .tmp then rename).
    pub fn save(&self) -> Result<(), SettingsError> {
        let data = self.data.lock().clone();
        let json = serde_json::to_string_pretty(&data)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        self.is_dirty.store(false, Ordering::Release);
        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    /// Save only if something changed since the last save.
    pub fn save_if_dirty(&self) -> Result<bool, SettingsError> {
        if !self.is_dirty.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Copy of the current settings.
    pub fn get(&self) -> GrabberSettings {
        self.data.lock().clone()
    }

    /// Modify the settings in memory and mark them dirty.
    pub fn update(&self, f: impl FnOnce(&mut GrabberSettings)) {
        f(&mut self.data.lock());
        self.is_dirty.store(true, Ordering::Release);
    }

    /// Restore defaults in memory and mark them dirty.
    pub fn reset(&self) {
        *self.data.lock() = GrabberSettings::default();
        self.is_dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }
}
