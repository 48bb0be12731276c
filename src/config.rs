// Front-end configuration.
//
// Read from an optional TOML file in the user's config directory; command-line
// flags override individual fields.

use crate::error::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_BACKEND: &str = "unison";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Unison executable to run.
    pub backend: String,
    /// Arguments placed before `-dumbtty`, usually a profile name.
    pub extra_args: Vec<String>,
    /// Start propagating as soon as the plan is ready.
    pub auto_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            extra_args: Vec::new(),
            auto_sync: false,
        }
    }
}

impl Config {
    /// `<config dir>/unison-drive/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unison-drive").join("config.toml"))
    }

    /// Load `path`, or the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw).map_err(|source| DriverError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.trim().is_empty() {
            return Err(DriverError::Config("backend must not be empty".to_string()));
        }
        if self.extra_args.iter().any(|a| a == "-dumbtty") {
            return Err(DriverError::Config(
                "extra_args must not contain -dumbtty; it is always added".to_string(),
            ));
        }
        Ok(())
    }

    /// The full argument list passed to the backend.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("-dumbtty".to_string());
        args
    }
}
