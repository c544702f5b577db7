//! Configuration for the lmgate gateway.
//!
//! Values are layered in three steps: built-in defaults, an optional TOML file,
//! then typed environment overrides. `raw` holds the all-optional shape that the
//! layers fill in, `validated` holds the checked result the server runs with.

pub mod env;
pub mod raw;
pub mod validated;

use std::{fs, path::Path};

use serde::de::DeserializeOwned;

pub use env::EnvSource;
pub use raw::gateway::{RawEngineConfig, RawGatewayConfig, RawVisionConfig};
pub use validated::gateway::{FinalEngineConfig, FinalGatewayConfig, FinalVisionConfig};

/// Environment variable naming an optional TOML file layered under the env overrides.
pub const CONFIG_PATH_ENV: &str = "LMGATE_CONFIG";

/// Read on its own, ahead of the rest, so logging is up before config warnings fire.
pub const LOG_LEVEL_ENV: &str = "LMGATE_LOG_LEVEL";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

pub fn load_toml<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn log_level<F>(env: &EnvSource<F>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env.string(LOG_LEVEL_ENV)
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Builds the validated config from defaults, the optional file named by
/// [`CONFIG_PATH_ENV`], and the variables visible through `env`.
pub fn load_gateway_config<F>(env: &EnvSource<F>) -> Result<FinalGatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw: RawGatewayConfig = match env.string(CONFIG_PATH_ENV) {
        Some(path) => load_toml(path)?,
        None => RawGatewayConfig::default(),
    };
    raw.apply_env(env);
    raw.fill_default();
    FinalGatewayConfig::from_raw(raw)
}
