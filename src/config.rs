//! Engine configuration.
//!
//! Precedence, lowest to highest: built-in defaults, TOML file, environment.
//! Environment variables are `TOKENBUCKET_<FIELD>` in upper case.
//!
//! ```toml
//! record_format = "versioned"
//! refill_policy = "truncate"
//! max_name_size = 512
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;
use snafu::ensure;

use crate::codec::RecordFormat;
use crate::constants::DEFAULT_MAX_NAME_SIZE;
use crate::constants::MAX_NAME_SIZE_CEILING;
use crate::pure::RefillPolicy;

/// Environment variable overriding [`EngineConfig::record_format`].
pub const ENV_RECORD_FORMAT: &str = "TOKENBUCKET_RECORD_FORMAT";
/// Environment variable overriding [`EngineConfig::refill_policy`].
pub const ENV_REFILL_POLICY: &str = "TOKENBUCKET_REFILL_POLICY";
/// Environment variable overriding [`EngineConfig::max_name_size`].
pub const ENV_MAX_NAME_SIZE: &str = "TOKENBUCKET_MAX_NAME_SIZE";

/// Runtime configuration for the engine and its host store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Layout used to read and write bucket records.
    pub record_format: RecordFormat,
    /// How stored timestamps advance after a consume.
    pub refill_policy: RefillPolicy,
    /// Longest accepted bucket name in bytes.
    pub max_name_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            record_format: RecordFormat::default(),
            refill_policy: RefillPolicy::default(),
            max_name_size: DEFAULT_MAX_NAME_SIZE,
        }
    }
}

/// Errors from loading configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse TOML config file {}: {source}", path.display()))]
    ParseToml { path: PathBuf, source: toml::de::Error },

    #[snafu(display("invalid value '{value}' in {variable}: {reason}"))]
    InvalidEnv {
        variable: String,
        value: String,
        reason: String,
    },

    #[snafu(display("configuration validation failed: {message}"))]
    Validation { message: String },
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        toml::from_str(&content).context(ParseTomlSnafu { path })
    }

    /// Overlay values present in `vars` onto `self`.
    ///
    /// `vars` looks up a variable by name; production code passes
    /// [`std::env::var`], tests pass a map.
    pub fn apply_env<F>(mut self, vars: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = vars(ENV_RECORD_FORMAT) {
            self.record_format = parse_var(ENV_RECORD_FORMAT, &value)?;
        }
        if let Some(value) = vars(ENV_REFILL_POLICY) {
            self.refill_policy = parse_var(ENV_REFILL_POLICY, &value)?;
        }
        if let Some(value) = vars(ENV_MAX_NAME_SIZE) {
            self.max_name_size = parse_var(ENV_MAX_NAME_SIZE, &value)?;
        }
        Ok(self)
    }

    /// Defaults, then `path` if given, then the process environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Check bounds that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.max_name_size > 0,
            ValidationSnafu {
                message: "max_name_size must be greater than 0",
            }
        );
        ensure!(
            self.max_name_size <= MAX_NAME_SIZE_CEILING,
            ValidationSnafu {
                message: format!("max_name_size {} exceeds ceiling {}", self.max_name_size, MAX_NAME_SIZE_CEILING),
            }
        );
        Ok(())
    }
}

fn parse_var<T>(variable: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        variable: variable.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
