//! Runtime configuration, loaded from a TOML file.

use crate::error::{Error, Result};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

/// Highest accepted chattiness level.
pub const MAX_CHATTINESS: u8 = 100;

/// Top-level configuration.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// usable setup backed by `markov.db` in the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// SQLite file shared by every tenant's brain.
    pub database_path: PathBuf,
    /// Generation parameters applied to every engine the registry opens.
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("markov.db"),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|error| Error::InvalidConfig(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("database_path must not be empty".into()));
        }
        self.engine.validate()
    }
}

/// Per-engine generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Number of tokens in a seed.
    pub chain_length: usize,
    /// Cap on the number of tokens in a generated reply.
    pub max_output_words: usize,
    /// Attempts made by speak/babble before keeping the longest reply.
    pub tries: usize,
    /// Chattiness assigned to newly created brains.
    pub default_chattiness: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chain_length: 2,
            max_output_words: 100,
            tries: 10,
            default_chattiness: 1,
        }
    }
}

impl EngineConfig {
    /// Build a validated config.
    pub fn new(chain_length: usize, max_output_words: usize, tries: usize) -> Result<Self> {
        let config = Self {
            chain_length,
            max_output_words,
            tries,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_length == 0 {
            return Err(Error::InvalidConfig("chain_length must be at least 1".into()));
        }
        if self.max_output_words == 0 {
            return Err(Error::InvalidConfig(
                "max_output_words must be at least 1".into(),
            ));
        }
        if self.tries == 0 {
            return Err(Error::InvalidConfig("tries must be at least 1".into()));
        }
        validate_chattiness(self.default_chattiness)
    }
}

pub fn validate_chattiness(level: u8) -> Result<()> {
    if level > MAX_CHATTINESS {
        return Err(Error::InvalidConfig(format!(
            "chattiness must be between 0 and {MAX_CHATTINESS}, got {level}"
        )));
    }
    Ok(())
}
