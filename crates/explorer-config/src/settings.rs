//! Explorer settings (elm-test-explorer.toml)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete explorer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    /// How projects are found inside a workspace folder
    pub discovery: DiscoveryConfig,

    /// How test runs are dispatched
    pub run: RunConfig,

    /// Logging configuration
    pub log: LogConfig,
}

/// Project discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// File name marking a project directory (default: "elm.json")
    pub manifest: String,

    /// Directory next to the manifest that must exist for the project to
    /// be considered testable (default: "tests")
    pub tests_dir: String,

    /// Directory names never descended into while scanning
    pub exclude: Vec<String>,

    /// Follow symbolic links while scanning
    pub follow_links: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            manifest: "elm.json".to_string(),
            tests_dir: "tests".to_string(),
            exclude: vec!["node_modules".to_string(), "elm-stuff".to_string()],
            follow_links: false,
        }
    }
}

impl DiscoveryConfig {
    /// Whether a directory name is excluded from scanning
    pub fn is_excluded(&self, dir_name: &str) -> bool {
        self.exclude.iter().any(|excluded| excluded == dir_name)
    }
}

/// Run dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum number of projects executing at the same time (unbounded when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_projects: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default log level, overridden by RUST_LOG
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> ConfigResult<()> {
        validate_file_name("discovery.manifest", &self.discovery.manifest)?;
        validate_file_name("discovery.tests_dir", &self.discovery.tests_dir)?;

        if self.run.max_parallel_projects == Some(0) {
            return Err(ConfigError::invalid(
                "run.max_parallel_projects",
                "must be at least 1",
            ));
        }

        let level = self.log.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid(
                "log.level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }

        Ok(())
    }
}

/// Manifest and tests dir are matched against single path components
fn validate_file_name(field: &str, value: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "cannot be empty"));
    }
    if value.contains(['/', '\\']) {
        return Err(ConfigError::invalid(
            field,
            "must be a plain name, not a path",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_target_elm_projects() {
        let config = ExplorerConfig::default();
        assert_eq!(config.discovery.manifest, "elm.json");
        assert_eq!(config.discovery.tests_dir, "tests");
        assert!(config.discovery.is_excluded("node_modules"));
        assert!(config.discovery.is_excluded("elm-stuff"));
        assert!(!config.discovery.is_excluded("src"));
        assert_eq!(config.run.max_parallel_projects, None);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ExplorerConfig = toml::from_str(
            r#"
[run]
max_parallel_projects = 2
"#,
        )
        .unwrap();

        assert_eq!(config.run.max_parallel_projects, Some(2));
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ExplorerConfig, _> = toml::from_str(
            r#"
[discovery]
manifests = "elm.json"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_parallelism_invalid() {
        let mut config = ExplorerConfig::default();
        config.run.max_parallel_projects = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "run.max_parallel_projects"
        ));
    }

    #[test]
    fn test_manifest_must_be_file_name() {
        let mut config = ExplorerConfig::default();
        config.discovery.manifest = "sub/elm.json".to_string();
        assert!(config.validate().is_err());

        config.discovery.manifest = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = ExplorerConfig::default();
        config.log.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.log.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
