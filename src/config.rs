use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port for the prediction API
    pub port: u16,
    /// Largest accepted request body; base64 inflates an image by a third
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Artifact written by `train` and loaded by `serve`
    pub artifact_path: PathBuf,
}

/// Where the trainer reads MNIST from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    /// Download through burn's vision dataset (cached after first run)
    Download,
    /// Uncompressed IDX files in `training.data_dir`
    Idx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    pub dataset: DatasetSource,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Full passes over the training split
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of the training split held out for validation (taken from the end)
    pub validation_split: f64,
    /// Seed for the per-epoch shuffle order
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetSource::Download,
            data_dir: None,
            epochs: 5,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_split: 0.2,
            seed: default_seed(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("server.max_body_bytes", DEFAULT_MAX_BODY_BYTES as i64)?
            .set_default("model.artifact_path", "digit_model.json")?
            .set_default("training.dataset", "download")?
            .set_default("training.epochs", 5)?
            .set_default("training.batch_size", 32)?
            .set_default("training.learning_rate", 1e-3)?
            .set_default("training.validation_split", 0.2)?
            .set_default("training.seed", 42)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DIGITSCOPE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DIGITSCOPE_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("DIGITSCOPE")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.server.max_body_bytes == 0 {
            errors.push("server.max_body_bytes must be positive".to_string());
        }

        if self.model.artifact_path.as_os_str().is_empty() {
            errors.push("model.artifact_path must not be empty".to_string());
        }

        let training = &self.training;
        if training.epochs == 0 {
            errors.push("training.epochs must be positive".to_string());
        }
        if training.batch_size == 0 {
            errors.push("training.batch_size must be positive".to_string());
        }
        if !(training.learning_rate.is_finite() && training.learning_rate > 0.0) {
            errors.push("training.learning_rate must be a positive number".to_string());
        }
        if !(0.0..1.0).contains(&training.validation_split) {
            errors.push("training.validation_split must be in [0, 1)".to_string());
        }
        if training.dataset == DatasetSource::Idx && training.data_dir.is_none() {
            errors.push("training.data_dir is required when training.dataset = \"idx\"".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_files() {
        let dir = std::env::temp_dir().join("digitscope-config-missing");
        let config = AppConfig::load_from(&dir).unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.model.artifact_path, PathBuf::from("digit_model.json"));
        assert_eq!(config.training.dataset, DatasetSource::Download);
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let dir = std::env::temp_dir().join("digitscope-config-missing");
        let mut config = AppConfig::load_from(&dir).unwrap();
        config.training.batch_size = 0;
        config.training.validation_split = 1.0;
        config.training.dataset = DatasetSource::Idx;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("batch_size")));
    }

    #[test]
    fn test_training_defaults_match_loader() {
        let defaults = TrainingConfig::default();
        assert_eq!(defaults.epochs, 5);
        assert_eq!(defaults.batch_size, 32);
        assert!((defaults.validation_split - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = std::env::temp_dir().join(format!("digitscope-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("default.toml"), "[server]\nport = \"not a port\"\n").unwrap();

        let result = AppConfig::load_from(&dir);
        std::fs::remove_dir_all(&dir).ok();
        assert!(matches!(result, Err(crate::error::DigitError::Config(_))));
    }
}
