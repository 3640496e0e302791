//! Pipeline configuration.
//!
//! ```yaml
//! validate_queries: true
//! validation_cache:
//!   enabled: true
//!   capacity: 512
//! apollo_tracing: false
//! ```

use std::num::NonZeroUsize;

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigurationError;

/// The configuration of a [`crate::Pipeline`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Validate queries before executing them.
    /// default: true
    #[serde(default = "default_validate_queries")]
    pub validate_queries: bool,

    /// Cache the validation errors of queries across requests.
    #[serde(default)]
    pub validation_cache: ValidationCacheConfig,

    /// Report timings in the `tracing` response extension.
    /// default: false
    #[serde(default)]
    pub apollo_tracing: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            validate_queries: default_validate_queries(),
            validation_cache: ValidationCacheConfig::default(),
            apollo_tracing: false,
        }
    }
}

fn default_validate_queries() -> bool {
    true
}

/// Configuration of the validation cache.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ValidationCacheConfig {
    /// default: false
    #[serde(default)]
    pub enabled: bool,

    /// Number of queries whose validation errors are kept.
    /// default: 512
    #[serde(default = "default_cache_capacity")]
    pub capacity: NonZeroUsize,
}

impl Default for ValidationCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> NonZeroUsize {
    NonZeroUsize::new(512).unwrap_or(NonZeroUsize::MIN)
}

impl Configuration {
    /// Parse a YAML (or JSON) configuration. Empty input yields the defaults.
    pub fn from_yaml(input: &str) -> Result<Self, ConfigurationError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value =
            serde_yaml::from_str(input).map_err(|e| ConfigurationError::InvalidConfiguration {
                message: "could not parse yaml",
                error: e.to_string(),
            })?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(ConfigurationError::DeserializeConfigError)
    }

    /// Generate a JSON schema for the configuration.
    pub fn schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings
            .into_generator()
            .into_root_schema_for::<Configuration>()
    }
}
