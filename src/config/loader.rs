//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::RelayConfig;

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .claude-relay.toml
        search_paths.push(PathBuf::from(".claude-relay.toml"));

        // 2. User config directory: ~/.config/claude-relay/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("claude-relay").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<RelayConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(RelayConfig::default())
    }

    /// Load configuration, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or an override is invalid.
    pub fn load_with_env(&self) -> Result<RelayConfig, ConfigError> {
        let mut config = self.load()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<RelayConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Recognised keys: `CLAUDE_TIMEOUT_SECONDS`, `CLAUDE_MAX_TURNS`,
/// `CLAUDE_ALLOWED_TOOLS` (comma separated), `APPROVED_DIRECTORY`,
/// `RATE_LIMIT_REQUESTS`, `RATE_LIMIT_WINDOW`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnv` if a numeric variable does not parse.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("CLAUDE_TIMEOUT_SECONDS") {
        config.executor.timeout_secs = parse_env("CLAUDE_TIMEOUT_SECONDS", &value)?;
    }
    if let Some(value) = lookup("CLAUDE_MAX_TURNS") {
        config.executor.max_turns = parse_env("CLAUDE_MAX_TURNS", &value)?;
    }
    if let Some(value) = lookup("CLAUDE_ALLOWED_TOOLS") {
        config.executor.allowed_tools = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(value) = lookup("APPROVED_DIRECTORY") {
        config.executor.working_dir = PathBuf::from(value);
    }
    if let Some(value) = lookup("RATE_LIMIT_REQUESTS") {
        config.gate.limit = parse_env("RATE_LIMIT_REQUESTS", &value)?;
    }
    if let Some(value) = lookup("RATE_LIMIT_WINDOW") {
        config.gate.window_secs = parse_env("RATE_LIMIT_WINDOW", &value)?;
    }
    Ok(())
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}
