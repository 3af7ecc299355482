//! View pool configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// How pooled trees are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    /// Entries are retained strictly under the size bound.
    Hard,

    /// Entries may be reclaimed under memory pressure; a pop can
    /// spuriously miss even when the entry was logically present.
    Soft,
}

/// Whether a `RefreshRequired` tree is rebuilt automatically after its
/// transient and dynamically-added content has been cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshStrategy {
    #[serde(rename = "auto")]
    Auto,

    #[serde(rename = "true")]
    Always,

    #[serde(rename = "false")]
    Never,
}

impl RefreshStrategy {
    /// Whether the view-build step should run over a refreshed tree.
    /// `Auto` defers to the caller's default, which is to rebuild.
    pub fn should_rebuild(self) -> bool {
        !matches!(self, RefreshStrategy::Never)
    }
}

/// Recognized pool options, loadable from YAML or built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Master switch; a disabled pool never stores and never hits
    #[serde(default)]
    pub enabled: bool,

    /// Retention mode for pooled trees
    #[serde(default = "default_entry_mode")]
    pub entry_mode: EntryMode,

    /// Maximum number of entries per view id, all tiers combined
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Rebuild behavior for `RefreshRequired` trees
    #[serde(default = "default_refresh_strategy")]
    pub refresh_transient_build: RefreshStrategy,
}

fn default_entry_mode() -> EntryMode {
    EntryMode::Hard
}

fn default_max_pool_size() -> usize {
    5
}

fn default_refresh_strategy() -> RefreshStrategy {
    RefreshStrategy::Auto
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            enabled: false,
            entry_mode: default_entry_mode(),
            max_pool_size: default_max_pool_size(),
            refresh_transient_build: default_refresh_strategy(),
        }
    }
}

impl PoolConfig {
    /// An enabled configuration with defaults, convenient in tests and
    /// embedded setups.
    pub fn enabled() -> Self {
        PoolConfig {
            enabled: true,
            ..PoolConfig::default()
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PoolConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PoolConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.entry_mode, EntryMode::Hard);
        assert_eq!(config.max_pool_size, 5);
        assert_eq!(config.refresh_transient_build, RefreshStrategy::Auto);
    }

    #[test]
    fn test_parse_yaml() {
        let config = PoolConfig::from_yaml(
            "enabled: true\nentry_mode: soft\nmax_pool_size: 20\nrefresh_transient_build: \"false\"\n",
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.entry_mode, EntryMode::Soft);
        assert_eq!(config.max_pool_size, 20);
        assert_eq!(config.refresh_transient_build, RefreshStrategy::Never);
        assert!(!config.refresh_transient_build.should_rebuild());
    }

    #[test]
    fn test_partial_yaml_uses_field_defaults() {
        let config = PoolConfig::from_yaml("enabled: true\n").unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_pool_size, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enabled: true").unwrap();
        writeln!(file, "max_pool_size: 3").unwrap();

        let config = PoolConfig::from_file(file.path()).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_pool_size, 3);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let err = PoolConfig::from_yaml("max_pool_size: [not a number]").unwrap_err();
        assert!(matches!(err, PoolConfigError::ParseError(_)));
    }
}
