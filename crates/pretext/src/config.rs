//! User-level settings from `~/.ptx/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use pretext_project::paths::home_path;

/// Settings that apply to every project of this user.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    /// Location of the core bundle.
    pub core_dir: Option<PathBuf>,

    /// Interpreter that runs the core.
    pub python: Option<String>,

    /// Default port for `pretext view`.
    pub port: u16,

    /// Write a log file below the project's `logs` directory.
    pub log_to_file: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            core_dir: None,
            python: None,
            port: 8128,
            log_to_file: true,
        }
    }
}

impl CliConfig {
    pub fn default_path() -> PathBuf {
        home_path().join("config.toml")
    }

    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempdir().unwrap();

        let config = CliConfig::load(&temp.path().join("config.toml")).unwrap();

        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn reads_partial_settings() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "python = \"/usr/bin/python3.12\"\nport = 9000\n").unwrap();

        let config = CliConfig::load(&path).unwrap();

        assert_eq!(config.python.as_deref(), Some("/usr/bin/python3.12"));
        assert_eq!(config.port, 9000);
        assert!(config.log_to_file);
        assert_eq!(config.core_dir, None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "port = \"eighty\"").unwrap();

        assert!(CliConfig::load(&path).is_err());
    }
}
