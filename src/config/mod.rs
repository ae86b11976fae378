//! Configuration management
//!
//! This module handles loading and parsing configuration for the blog application.
//! Configuration is layered:
//! - Environment profile (`development` or `production`) picks the defaults
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Secret key used when none is configured. Refused in production.
pub const DEV_SECRET_KEY: &str = "blog-development-secret-key";

/// Environment profile the application runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Debug mode default for this profile
    pub fn default_debug(&self) -> bool {
        matches!(self, Environment::Development)
    }

    /// Log level default for this profile
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Production => "warn",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active environment profile
    #[serde(default)]
    pub environment: Environment,
    /// Debug mode; falls back to the profile default when unset
    #[serde(default)]
    pub debug: Option<bool>,
    /// Key used to sign session ids and CSRF tokens
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub csrf: CsrfConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            debug: None,
            secret_key: default_secret_key(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            session: SessionConfig::default(),
            csrf: CsrfConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
            assets: AssetsConfig::default(),
        }
    }
}

fn default_secret_key() -> String {
    DEV_SECRET_KEY.to_string()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/blog.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
        }
    }
}

impl RedisConfig {
    /// Connection URL in the form `redis://host:port`
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

/// Session storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionDriver {
    /// In-process store (default)
    #[default]
    Memory,
    /// `sessions` table in the configured database
    Database,
    /// Redis (requires the `redis-session` feature)
    Redis,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub driver: SessionDriver,
    /// Name of the cookie carrying the session id
    #[serde(default = "default_session_cookie_name")]
    pub cookie_name: String,
    /// Session lifetime in seconds (default: 2 days)
    #[serde(default = "default_session_lifetime")]
    pub lifetime_seconds: u64,
    /// Sign the session id cookie with the secret key
    #[serde(default = "default_true")]
    pub use_signer: bool,
    /// Interval between expired-session sweeps in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            driver: SessionDriver::default(),
            cookie_name: default_session_cookie_name(),
            lifetime_seconds: default_session_lifetime(),
            use_signer: true,
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_session_cookie_name() -> String {
    "session".to_string()
}

fn default_session_lifetime() -> u64 {
    2 * 24 * 60 * 60
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// CSRF protection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Validate tokens on state-changing requests
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum token age in seconds; `None` disables the age check
    #[serde(default = "default_csrf_time_limit")]
    pub time_limit_seconds: Option<u64>,
    /// Request headers searched for the token, in order
    #[serde(default = "default_csrf_headers")]
    pub header_names: Vec<String>,
    /// Form field searched for the token in urlencoded bodies
    #[serde(default = "default_csrf_field")]
    pub field_name: String,
    /// Maximum urlencoded body size buffered while looking for the form field
    #[serde(default = "default_csrf_body_limit")]
    pub max_body_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_limit_seconds: default_csrf_time_limit(),
            header_names: default_csrf_headers(),
            field_name: default_csrf_field(),
            max_body_bytes: default_csrf_body_limit(),
        }
    }
}

fn default_csrf_time_limit() -> Option<u64> {
    Some(3600)
}

fn default_csrf_headers() -> Vec<String> {
    vec!["X-CSRFToken".to_string(), "X-CSRF-Token".to_string()]
}

fn default_csrf_field() -> String {
    "csrf_token".to_string()
}

fn default_csrf_body_limit() -> usize {
    2 * 1024 * 1024 // 2MB
}

/// Cross-origin preflight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allow credentials on preflight responses (mirrors the request origin)
    #[serde(default = "default_true")]
    pub supports_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            supports_credentials: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter; falls back to the profile default when unset
    #[serde(default)]
    pub level: Option<String>,
    /// Log file path
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Maximum size of one log file before rotation (default: 100MB)
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
    /// Number of rotated files kept
    #[serde(default = "default_log_backup_count")]
    pub backup_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            file: default_log_file(),
            max_bytes: default_log_max_bytes(),
            backup_count: default_log_backup_count(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/blog.log")
}

fn default_log_max_bytes() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_log_backup_count() -> usize {
    10
}

/// Static files and templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            templates_dir: default_templates_dir(),
        }
    }
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Unknown environment '{0}' (expected 'development' or 'production')")]
    UnknownEnvironment(String),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Default configuration for a named environment profile
    pub fn for_environment(name: &str) -> Result<Self, ConfigError> {
        let environment = name.parse::<Environment>()?;
        Ok(Self {
            environment,
            ..Self::default()
        })
    }

    /// Load configuration from file for the given environment
    ///
    /// If the file doesn't exist or is empty, returns the profile defaults.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &Path, environment: Environment) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self {
                environment,
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self {
                environment,
                ..Self::default()
            });
        }

        let mut config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;
        config.environment = environment;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - BLOG_SERVER_HOST
    /// - BLOG_SERVER_PORT
    /// - BLOG_SECRET_KEY
    /// - BLOG_DATABASE_DRIVER
    /// - BLOG_DATABASE_URL
    /// - BLOG_REDIS_HOST
    /// - BLOG_REDIS_PORT
    /// - BLOG_SESSION_DRIVER
    /// - BLOG_LOG_LEVEL
    /// - BLOG_LOG_FILE
    pub fn load_with_env(path: &Path, environment: Environment) -> anyhow::Result<Self> {
        let mut config = Self::load(path, environment)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BLOG_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BLOG_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(secret_key) = std::env::var("BLOG_SECRET_KEY") {
            self.secret_key = secret_key;
        }

        if let Ok(driver) = std::env::var("BLOG_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("BLOG_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(host) = std::env::var("BLOG_REDIS_HOST") {
            self.redis.host = host;
        }
        if let Ok(port) = std::env::var("BLOG_REDIS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.redis.port = port;
            }
        }

        if let Ok(driver) = std::env::var("BLOG_SESSION_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.session.driver = SessionDriver::Memory,
                "database" => self.session.driver = SessionDriver::Database,
                "redis" => self.session.driver = SessionDriver::Redis,
                _ => {} // Ignore invalid values
            }
        }

        if let Ok(level) = std::env::var("BLOG_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Ok(file) = std::env::var("BLOG_LOG_FILE") {
            self.logging.file = PathBuf::from(file);
        }
    }

    /// Check settings that cannot be expressed through serde defaults
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "secret_key must not be empty".to_string(),
            ));
        }
        if self.environment == Environment::Production && self.secret_key == DEV_SECRET_KEY {
            return Err(ConfigError::ValidationError(
                "secret_key must be set explicitly in production".to_string(),
            ));
        }
        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "session.cookie_name must not be empty".to_string(),
            ));
        }
        if self.logging.backup_count == 0 || self.logging.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "logging.max_bytes and logging.backup_count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective debug flag
    pub fn is_debug(&self) -> bool {
        self.debug.unwrap_or_else(|| self.environment.default_debug())
    }

    /// Effective log level filter
    pub fn log_level(&self) -> &str {
        self.logging
            .level
            .as_deref()
            .unwrap_or_else(|| self.environment.default_log_level())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "BLOG_SERVER_HOST",
    "BLOG_SERVER_PORT",
    "BLOG_SECRET_KEY",
    "BLOG_DATABASE_DRIVER",
    "BLOG_DATABASE_URL",
    "BLOG_REDIS_HOST",
    "BLOG_REDIS_PORT",
    "BLOG_SESSION_DRIVER",
    "BLOG_LOG_LEVEL",
    "BLOG_LOG_FILE",
];
