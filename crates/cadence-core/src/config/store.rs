//! Persisted configuration store with atomic read-modify-write.

use std::path::{Path, PathBuf};

use super::parser::{CeremonyConfig, ConfigError, ConfigFormat};
use crate::persist::write_atomic;

/// File-backed ceremony configuration.
///
/// The store holds no cached copy: every [`load`](Self::load) re-reads the
/// file, and [`update`](Self::update) is the only write path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current configuration.
    ///
    /// A missing file is an empty configuration: every lookup then resolves
    /// to the global default.
    pub fn load(&self) -> Result<CeremonyConfig, ConfigError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No ceremony config found, using defaults");
            return Ok(CeremonyConfig::default());
        }
        CeremonyConfig::from_file(&self.path)
    }

    /// Apply `edit` to the persisted configuration and write it back atomically.
    ///
    /// The edited document is validated before anything is written; an
    /// invalid edit leaves the file untouched.
    pub fn update<F>(&self, edit: F) -> Result<CeremonyConfig, ConfigError>
    where
        F: FnOnce(&mut CeremonyConfig),
    {
        let mut config = self.load()?;
        edit(&mut config);
        config.validate()?;

        let rendered = config.render(ConfigFormat::from_path(&self.path))?;
        write_atomic(&self.path, rendered.as_bytes())?;

        tracing::info!(path = %self.path.display(), "Ceremony config updated");
        Ok(config)
    }
}
