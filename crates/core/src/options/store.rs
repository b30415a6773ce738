//! TOML-backed persistence for prompt options.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::PromptOptions;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Failed to parse options file: {0}")]
    Parse(String),

    #[error("Failed to serialize options: {0}")]
    Serialize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads and saves [`PromptOptions`] from a single TOML file.
///
/// A missing file is not an error; it reads as the defaults so a fresh
/// deployment works without any setup step.
#[derive(Debug, Clone)]
pub struct OptionsStore {
    path: PathBuf,
}

impl OptionsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<PromptOptions, OptionsError> {
        if !self.path.exists() {
            return Ok(PromptOptions::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        toml::from_str(&raw).map_err(|e| OptionsError::Parse(e.to_string()))
    }

    pub fn save(&self, options: &PromptOptions) -> Result<(), OptionsError> {
        let raw =
            toml::to_string_pretty(options).map_err(|e| OptionsError::Serialize(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
