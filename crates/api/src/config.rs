use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

use domain::models::code::{ValidationMessages, MAX_BATCH_LIMIT};
use domain::services::CodeSettings;

/// `database.url` value selecting the in-memory store.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Allowed range for the random part of generated codes.
pub const CODE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

const MAX_PREFIX_LENGTH: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Code generation and listing settings
    #[serde(default)]
    pub codes: CodeSettings,
    /// Validation message catalogue
    #[serde(default)]
    pub messages: ValidationMessages,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL, or `memory` for the in-memory store
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// SHA-256 hex digest of the admin API key. Empty disables admin routes.
    #[serde(default)]
    pub admin_api_key_hash: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.trim().eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }

    /// Pool settings for the persistence layer.
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

impl SecurityConfig {
    pub fn admin_enabled(&self) -> bool {
        !self.admin_api_key_hash.is_empty()
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with CR__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CR").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides, without
    /// touching the file system or the environment. Not validated.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = "memory"

            [logging]
            level = "info"
            format = "json"

            [security]
            admin_api_key_hash = ""
            cors_origins = []

            [codes]
            length = 8
            max_generation_attempts = 20
            default_role = "subscriber"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CR__DATABASE__URL must be set (a PostgreSQL URL or \"memory\")".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            )));
        }

        if self.security.admin_enabled()
            && !shared::crypto::is_sha256_hex(&self.security.admin_api_key_hash)
        {
            return Err(ConfigValidationError::InvalidValue(
                "security.admin_api_key_hash must be a 64-character SHA-256 hex digest"
                    .to_string(),
            ));
        }

        self.validate_codes()
    }

    fn validate_codes(&self) -> Result<(), ConfigValidationError> {
        let codes = &self.codes;

        if !CODE_LENGTH_RANGE.contains(&codes.length) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "codes.length must be between {} and {}",
                CODE_LENGTH_RANGE.start(),
                CODE_LENGTH_RANGE.end()
            )));
        }

        if let Some(prefix) = codes.prefix.as_deref().map(str::trim) {
            let well_formed = prefix.is_empty()
                || (prefix.len() <= MAX_PREFIX_LENGTH
                    && prefix.starts_with(|c: char| c.is_ascii_alphanumeric())
                    && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
            if !well_formed {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "codes.prefix must be at most {MAX_PREFIX_LENGTH} letters, digits or '-', \
                     starting with a letter or digit"
                )));
            }
        }

        if codes.max_generation_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "codes.max_generation_attempts must be at least 1".to_string(),
            ));
        }

        if codes.max_batch_size == 0 || codes.max_batch_size > MAX_BATCH_LIMIT {
            return Err(ConfigValidationError::InvalidValue(format!(
                "codes.max_batch_size must be between 1 and {MAX_BATCH_LIMIT}"
            )));
        }

        if shared::validation::validate_role(&codes.default_role).is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "codes.default_role {:?} is not a valid role slug",
                codes.default_role
            )));
        }

        if codes.default_page_size == 0 || codes.default_page_size > codes.max_page_size {
            return Err(ConfigValidationError::InvalidValue(
                "codes.default_page_size must be between 1 and codes.max_page_size".to_string(),
            ));
        }

        if codes.max_export_rows == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "codes.max_export_rows must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
