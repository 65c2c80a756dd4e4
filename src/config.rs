use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::census_catalog::year_schema::DEFAULT_BASE_URL;
use crate::census_catalog::CensusYear;
use crate::query_generator::ColumnBudget;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loader configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_column_thresholds"))]
#[serde(default)]
pub struct LoaderConfig {
    /// Root URL of the published census files
    #[validate(length(min = 1, message = "Base URL cannot be empty"))]
    pub base_url: String,

    /// Census year used when a request does not name one
    pub default_year: CensusYear,

    /// Column count that triggers a warning (`None` disables the warning)
    pub column_warn_threshold: Option<usize>,

    /// Column count at which a request is rejected (`None` disables the cap)
    pub column_reject_threshold: Option<usize>,

    /// Attempts for a live category lookup, including the first one
    #[validate(range(
        min = 1,
        max = 10,
        message = "Retry attempts must be between 1 and 10"
    ))]
    pub retry_max_attempts: u32,

    /// Delay before the first retry; doubles on every further retry
    pub retry_base_delay_ms: u64,

    /// Whether metadata lookups are cached in memory
    pub cache_enabled: bool,

    /// Maximum number of cached metadata payloads (LRU eviction)
    #[validate(range(min = 1, message = "Cache must hold at least one entry"))]
    pub cache_max_entries: usize,

    /// Whether to install and load the httpfs and spatial extensions on connect
    pub load_extensions: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_year: CensusYear::Y2022,
            column_warn_threshold: Some(50),
            column_reject_threshold: Some(100),
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            cache_enabled: true,
            cache_max_entries: 1000,
            load_extensions: true,
        }
    }
}

impl LoaderConfig {
    /// Create configuration from environment variables with validation
    ///
    /// A `.env` file in the working directory is read first. Threshold
    /// variables accept `none` to disable the threshold.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            base_url: env::var("CENSO_BASE_URL").unwrap_or(defaults.base_url),
            default_year: parse_env_var("CENSO_DEFAULT_YEAR", "2022")?,
            column_warn_threshold: parse_optional_env_var("CENSO_COLUMN_WARN_THRESHOLD", "50")?,
            column_reject_threshold: parse_optional_env_var(
                "CENSO_COLUMN_REJECT_THRESHOLD",
                "100",
            )?,
            retry_max_attempts: parse_env_var("CENSO_RETRY_MAX_ATTEMPTS", "3")?,
            retry_base_delay_ms: parse_env_var("CENSO_RETRY_BASE_DELAY_MS", "1000")?,
            cache_enabled: parse_env_var("CENSO_CACHE_ENABLED", "true")?,
            cache_max_entries: parse_env_var("CENSO_CACHE_MAX_ENTRIES", "1000")?,
            load_extensions: parse_env_var("CENSO_LOAD_EXTENSIONS", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            base_url: cli.base_url,
            default_year: cli.default_year,
            column_warn_threshold: cli.column_warn_threshold,
            column_reject_threshold: cli.column_reject_threshold,
            retry_max_attempts: cli.retry_max_attempts,
            retry_base_delay_ms: cli.retry_base_delay_ms,
            cache_enabled: !cli.no_cache,
            cache_max_entries: cli.cache_max_entries,
            load_extensions: !cli.skip_extensions,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    ///
    /// Missing keys take their default values.
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn column_budget(&self) -> ColumnBudget {
        ColumnBudget {
            warn_at: self.column_warn_threshold,
            reject_at: self.column_reject_threshold,
        }
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub base_url: String,
    pub default_year: CensusYear,
    pub column_warn_threshold: Option<usize>,
    pub column_reject_threshold: Option<usize>,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub no_cache: bool,
    pub cache_max_entries: usize,
    pub skip_extensions: bool,
}

fn validate_column_thresholds(config: &LoaderConfig) -> Result<(), ValidationError> {
    match (config.column_warn_threshold, config.column_reject_threshold) {
        (Some(warn), Some(reject)) if warn > reject => Err(ValidationError::new(
            "column_thresholds",
        )
        .with_message(Cow::Owned(format!(
            "Column warning threshold ({}) cannot exceed the rejection threshold ({})",
            warn, reject
        )))),
        _ => Ok(()),
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

/// Like [`parse_env_var`], but `none` (any case) or an empty value yields `None`
fn parse_optional_env_var<T: std::str::FromStr>(
    key: &str,
    default: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value: value.clone(),
        source: Box::new(e),
    })
}
