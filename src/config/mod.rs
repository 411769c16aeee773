//! Configuration management for roster-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SetupError;
use crate::models::Environment;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Per-environment backend configuration
    #[serde(default)]
    pub environments: EnvironmentsConfig,

    /// Sync engine configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from the conventional Supabase environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let production = &mut config.environments.production;
        production.url = std::env::var("SUPABASE_URL").ok();
        production.service_key = std::env::var("SUPABASE_SERVICE_KEY").ok();

        let staging = &mut config.environments.staging;
        staging.url = std::env::var("STAGING_SUPABASE_URL").ok();
        staging.service_key = std::env::var("STAGING_SUPABASE_SERVICE_KEY").ok();

        if let Ok(workers) = std::env::var("ROSTER_SYNC_WORKERS") {
            config.sync.workers = workers
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid worker count".to_string()))?;
        }
        if let Ok(level) = std::env::var("ROSTER_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check engine-wide settings that do not depend on credentials
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.workers == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.workers must be at least 1".to_string(),
            ));
        }
        if self.sync.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.page_size must be at least 1".to_string(),
            ));
        }
        if self.sync.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sync.bucket.trim().is_empty() {
            return Err(ConfigError::MissingRequired("sync.bucket".to_string()));
        }
        Ok(())
    }
}

/// Backend configuration for both environments
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentsConfig {
    /// Production deployment
    #[serde(default)]
    pub production: EnvironmentConfig,

    /// Staging deployment
    #[serde(default)]
    pub staging: EnvironmentConfig,
}

impl EnvironmentsConfig {
    /// Configuration for the given environment
    pub fn get(&self, env: Environment) -> &EnvironmentConfig {
        match env {
            Environment::Production => &self.production,
            Environment::Staging => &self.staging,
        }
    }
}

/// Which kind of backend an environment talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hosted Supabase project (PostgREST + Storage)
    #[default]
    Supabase,
    /// SQLite file plus a local blob directory
    Local,
}

/// Connection settings for one environment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    /// Backend kind
    #[serde(default)]
    pub backend: BackendKind,

    /// Project URL (Supabase backend)
    #[serde(default)]
    pub url: Option<String>,

    /// Service role key (Supabase backend)
    #[serde(default)]
    pub service_key: Option<String>,

    /// Base of absolute asset links; defaults to `url`
    #[serde(default)]
    pub public_url: Option<String>,

    /// SQLite database file (local backend)
    #[serde(default)]
    pub database_path: Option<String>,

    /// Blob root directory (local backend)
    #[serde(default)]
    pub storage_path: Option<String>,
}

impl EnvironmentConfig {
    /// Supabase environment with the given credentials
    pub fn supabase(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Supabase,
            url: Some(url.into()),
            service_key: Some(service_key.into()),
            ..Default::default()
        }
    }

    /// Local environment rooted at the given paths
    pub fn local(
        database_path: impl Into<String>,
        storage_path: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            backend: BackendKind::Local,
            database_path: Some(database_path.into()),
            storage_path: Some(storage_path.into()),
            public_url: Some(public_url.into()),
            ..Default::default()
        }
    }

    /// Check that everything the backend needs is present
    pub fn validate(&self, env: Environment) -> Result<(), SetupError> {
        match self.backend {
            BackendKind::Supabase => {
                let url = required(env, "url", self.url.as_deref())?;
                required(env, "service_key", self.service_key.as_deref())?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(SetupError::InvalidConfig {
                        environment: env,
                        message: format!("url must be http(s): {}", url),
                    });
                }
            }
            BackendKind::Local => {
                required(env, "database_path", self.database_path.as_deref())?;
                required(env, "storage_path", self.storage_path.as_deref())?;
                required(env, "public_url", self.public_url.as_deref())?;
            }
        }
        Ok(())
    }

    /// Base URL that absolute asset links of this environment start with
    pub fn public_base(&self) -> Option<&str> {
        self.public_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|v| is_set(v))
            .map(|v| v.trim_end_matches('/'))
    }
}

/// Returns the value if it is present and expanded
fn required<'a>(
    env: Environment,
    field: &str,
    value: Option<&'a str>,
) -> Result<&'a str, SetupError> {
    match value {
        Some(v) if is_set(v) => Ok(v.trim()),
        _ => Err(SetupError::MissingCredentials {
            environment: env,
            field: field.to_string(),
        }),
    }
}

/// A setting counts as present when non-blank and free of `${...}` leftovers
fn is_set(value: &str) -> bool {
    !value.trim().is_empty() && !value.contains("${")
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Storage bucket holding headshots
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Folder inside the bucket that is mirrored
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Size of the blob transfer worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rows fetched per request when reading a table
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Timeout for storage requests in seconds
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_secs: u64,

    /// Remote table names
    #[serde(default)]
    pub tables: TableNames,

    /// Retry configuration for storage calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            folder: default_folder(),
            workers: default_workers(),
            page_size: default_page_size(),
            storage_timeout_secs: default_storage_timeout(),
            tables: TableNames::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_bucket() -> String {
    "headshots".to_string()
}

fn default_folder() -> String {
    "eboard".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_page_size() -> usize {
    1000
}

fn default_storage_timeout() -> u64 {
    60
}

/// Names of the replicated tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableNames {
    /// Members table
    #[serde(default = "default_members_table")]
    pub members: String,

    /// Events table
    #[serde(default = "default_events_table")]
    pub events: String,

    /// Points table
    #[serde(default = "default_points_table")]
    pub points: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            members: default_members_table(),
            events: default_events_table(),
            points: default_points_table(),
        }
    }
}

fn default_members_table() -> String {
    "members".to_string()
}

fn default_events_table() -> String {
    "events".to_string()
}

fn default_points_table() -> String {
    "points_tracking".to_string()
}

/// Retry configuration for storage calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Maximum delay between attempts in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Whether to add jitter to backoff
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Retry policy without any delay, for tests and local backends
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..Default::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
