//! Service configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. Environment variables prefixed with `VIT_TRACKER__`, e.g.
//!    `VIT_TRACKER__MODEL__DEVICE=cuda:1`

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::model::ModelConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when no filter matches
    pub level: String,
    /// `EnvFilter` directives, e.g. `vit_tracker=debug`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = ServiceConfig::default();
        let mut builder = Config::builder()
            .set_default(
                "model.params_dir",
                defaults.model.params_dir.to_string_lossy().as_ref(),
            )?
            .set_default("model.param_name", defaults.model.param_name)?
            .set_default("model.device", defaults.model.device)?
            .set_default("logging.level", defaults.logging.level)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(Environment::with_prefix("VIT_TRACKER").separator("__"))
            .build()?
            .try_deserialize()
    }
}
