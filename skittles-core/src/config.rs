//! Project configuration loaded from `skittles.config.json`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "skittles.config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkittlesConfig {
    /// Run the TypeScript checker before compiling.
    pub type_check: bool,
    pub optimizer: OptimizerConfig,
    /// Relative to the project root.
    pub contracts_dir: PathBuf,
    /// Relative to the project root.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub enabled: bool,
    pub runs: u32,
}

impl Default for SkittlesConfig {
    fn default() -> Self {
        SkittlesConfig {
            type_check: true,
            optimizer: OptimizerConfig::default(),
            contracts_dir: PathBuf::from("contracts"),
            output_dir: PathBuf::from("build"),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            enabled: false,
            runs: 200,
        }
    }
}

impl SkittlesConfig {
    /// Read the config at the project root. A missing file yields the
    /// defaults; an unreadable or invalid one is an error.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(SkittlesConfig::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Malformed { path, source })
    }

    pub fn contracts_path(&self, root: &Path) -> PathBuf {
        root.join(&self.contracts_dir)
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SkittlesConfig::load(dir.path()).expect("load");
        assert_eq!(config, SkittlesConfig::default());
        assert!(config.type_check);
        assert_eq!(config.optimizer.runs, 200);
    }

    #[test]
    fn partial_files_keep_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "typeCheck": false, "optimizer": { "enabled": true }, "outputDir": "out" }"#,
        )
        .expect("write");
        let config = SkittlesConfig::load(dir.path()).expect("load");
        assert!(!config.type_check);
        assert_eq!(config.optimizer, OptimizerConfig { enabled: true, runs: 200 });
        assert_eq!(config.contracts_dir, PathBuf::from("contracts"));
        assert_eq!(config.output_path(dir.path()), dir.path().join("out"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "{ typeCheck: ").expect("write");
        let err = SkittlesConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }
}
