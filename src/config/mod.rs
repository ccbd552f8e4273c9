// src/config/mod.rs
mod schema;

use std::path::{Path, PathBuf};
use config::{Config as ConfigLoader, FileFormat};
use tracing::{info, warn};

pub use schema::{
    Config, GlobalConfig, CrawlerConfig, FuzzerConfig, AnalysisConfig,
    ReductionCaps, SessionConfig, RendererKind
};

use crate::error::{ScoutResult, ScoutError};

/// Centralized configuration handling
impl Config {
    /// Load configuration from a file or fall back to the built-in defaults
    pub fn load(config_path: Option<&Path>) -> ScoutResult<Self> {
        info!("Loading configuration");

        let mut config_builder = ConfigLoader::builder();

        // Default configuration
        config_builder = config_builder.add_source(
            config::File::from_str(
                include_str!("../../config/default.toml"),
                FileFormat::Toml
            )
        );

        // User-provided configuration
        if let Some(path) = config_path {
            if path.exists() {
                config_builder = config_builder.add_source(config::File::from(path));
                info!("Loading user configuration from: {}", path.display());
            } else {
                warn!("Specified configuration file not found: {}", path.display());
            }
        } else {
            let default_path = Self::get_default_config_path();
            if default_path.exists() {
                config_builder = config_builder.add_source(config::File::from(default_path.as_path()));
                info!("Loading default configuration from: {}", default_path.display());
            } else {
                info!("No existing configuration found, using built-in defaults");
            }
        }

        // Environment variables, e.g. VULNSCOUT_ANALYSIS__API_KEYS=k1,k2
        config_builder = config_builder.add_source(
            config::Environment::with_prefix("VULNSCOUT")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("analysis.api_keys")
        );

        let config: Config = match config_builder.build() {
            Ok(c) => match c.try_deserialize() {
                Ok(config) => config,
                Err(e) => return Err(ScoutError::ConfigError(format!("Failed to parse configuration: {}", e))),
            },
            Err(e) => return Err(ScoutError::ConfigError(format!("Failed to build configuration: {}", e))),
        };

        config.validate()?;

        Ok(config)
    }

    /// Reject settings that would stall the crawl or the analysis pool
    pub fn validate(&self) -> ScoutResult<()> {
        if self.crawler.batch_size == 0 {
            return Err(ScoutError::ConfigError("crawler.batch_size must be at least 1".to_string()));
        }
        if self.crawler.max_path_visits == 0 {
            return Err(ScoutError::ConfigError("crawler.max_path_visits must be at least 1".to_string()));
        }
        if self.fuzzer.concurrency == 0 {
            return Err(ScoutError::ConfigError("fuzzer.concurrency must be at least 1".to_string()));
        }
        if self.analysis.max_concurrency == 0 || self.analysis.default_cluster_size == 0 {
            return Err(ScoutError::ConfigError(
                "analysis.max_concurrency and analysis.default_cluster_size must be at least 1".to_string()
            ));
        }
        Ok(())
    }

    /// Get the default configuration path
    pub fn get_default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vulnscout/config.toml")
    }

    /// Initialize a new configuration
    pub fn init(force: bool) -> ScoutResult<PathBuf> {
        let config_path = Self::get_default_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScoutError::FileError {
                    path: parent.to_path_buf(),
                    message: format!("Failed to create directory: {}", e),
                })?;
        }

        if config_path.exists() && !force {
            return Err(ScoutError::ConfigError(
                format!("Configuration already exists at {}. Use --force to overwrite.", config_path.display())
            ));
        }

        let config = Config::default();
        config.save(&config_path)?;

        Ok(config_path)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ScoutResult<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| ScoutError::SerializationError(format!("Failed to serialize configuration: {}", e)))?;

        std::fs::write(path, config_str)
            .map_err(|e| ScoutError::FileError {
                path: path.to_path_buf(),
                message: format!("Failed to write configuration: {}", e),
            })?;

        info!("Configuration saved to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults_parse() {
        let config = Config::load(Some(Path::new("/nonexistent/vulnscout.toml"))).unwrap();

        assert_eq!(config.crawler.batch_size, 5);
        assert_eq!(config.crawler.renderer, RendererKind::Http);
        assert_eq!(config.analysis.caps.max_api_calls, 60);
        assert!(config.session.cookies.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.crawler.batch_size = 0;

        assert!(matches!(config.validate(), Err(ScoutError::ConfigError(_))));
    }
}
