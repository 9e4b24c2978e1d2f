//! Configuration Loader
//!
//! Handles loading the workspace configuration file and applying environment overrides.

use crate::settings::ExplorerConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in workspace folders
pub const CONFIG_FILE_NAME: &str = "elm-test-explorer.toml";

/// Configuration loader
///
/// Loads configuration with the following precedence:
/// 1. Built-in defaults - lowest priority
/// 2. elm-test-explorer.toml - overrides defaults
/// 3. Environment variables (ELM_TEST_EXPLORER_*) - overrides the file
pub struct ConfigLoader {
    /// Whether environment variables are consulted
    use_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective settings
    pub settings: ExplorerConfig,

    /// Configuration file the settings were read from, if any
    pub config_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { use_env: true }
    }

    /// Ignore ELM_TEST_EXPLORER_* environment variables
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Load configuration for a workspace folder
    ///
    /// Walks up the directory tree to find elm-test-explorer.toml. When no file
    /// is found the defaults are used.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let config_file = find_config_file(start_dir);

        let settings = match &config_file {
            Some(path) => ExplorerConfig::load_from_file(path)?,
            None => ExplorerConfig::default(),
        };

        self.finish(settings, config_file)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let settings = ExplorerConfig::load_from_file(config_path)?;
        self.finish(settings, Some(config_path.to_path_buf()))
    }

    fn finish(&self, settings: ExplorerConfig, config_file: Option<PathBuf>) -> ConfigResult<Config> {
        let settings = if self.use_env {
            apply_env_overrides(settings)?
        } else {
            settings
        };

        settings.validate()?;

        Ok(Config {
            settings,
            config_file,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Apply environment variable overrides
///
/// - ELM_TEST_EXPLORER_LOG: log level
/// - ELM_TEST_EXPLORER_MAX_PARALLEL: maximum concurrently running projects
/// - ELM_TEST_EXPLORER_MANIFEST: manifest file name
fn apply_env_overrides(mut config: ExplorerConfig) -> ConfigResult<ExplorerConfig> {
    if let Ok(level) = env::var("ELM_TEST_EXPLORER_LOG") {
        config.log.level = level.to_lowercase();
    }

    if let Ok(max_parallel) = env::var("ELM_TEST_EXPLORER_MAX_PARALLEL") {
        let parsed = max_parallel.trim().parse::<usize>().map_err(|_| {
            ConfigError::invalid(
                "ELM_TEST_EXPLORER_MAX_PARALLEL",
                format!("'{}' is not a positive integer", max_parallel),
            )
        })?;
        config.run.max_parallel_projects = Some(parsed);
    }

    if let Ok(manifest) = env::var("ELM_TEST_EXPLORER_MANIFEST") {
        config.discovery.manifest = manifest;
    }

    Ok(config)
}
