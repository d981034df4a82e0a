//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (QUERYGUARD_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [security]
//! mode = "read_only"
//! forbidden_keywords = ["DROP", "TRUNCATE", "GRANT"]
//!
//! [security.input_validation]
//! min_entropy = 0.5
//! max_entropy = 6.0
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUERYGUARD_SECURITY__MODE=read_write
//! QUERYGUARD_CACHE__ENABLED=false
//! ```
//!
//! The loaded [`Config`] is immutable after construction: every component
//! receives an `Arc<Config>` and none of them writes through it.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Loading or deserialization failed
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// Semantic validation failed
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub execution: ExecutionConfig,
    pub evolution: EvolutionConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
}

/// Application identity, used to build the skill's capability ID
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            name: "queryguard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Backend connection settings
///
/// Driver registration and connection bootstrapping live outside the core;
/// this section is parsed and handed to whatever factory constructs the
/// [`QueryBackend`](crate::backend::QueryBackend).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend driver name ("memory" for the built-in deterministic backend)
    pub driver: String,

    /// Driver-specific connection string
    pub dsn: String,

    pub pool: PoolConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            driver: "memory".to_string(),
            dsn: String::new(),
            pool: PoolConfig::default(),
        }
    }
}

/// Connection pool settings (consumed by external drivers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_open_connections: usize,
    pub max_idle_connections: usize,
    pub connection_max_lifetime: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_open_connections: 10,
            max_idle_connections: 5,
            connection_max_lifetime: "30m".to_string(),
        }
    }
}

/// Security policy evaluated by the guard pipeline
///
/// Immutable after load; this is the process-wide `SecurityPolicy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Operation mode: "read_only", "read_write", or "restricted"
    pub mode: String,

    /// Operations permitted in "restricted" mode, and the detection
    /// vocabulary for the L2 guard stage
    pub allowed_operations: Vec<String>,

    /// Keywords that reject input on a case-insensitive substring match
    pub forbidden_keywords: Vec<String>,

    pub input_validation: InputValidationConfig,
    pub resource_limits: ResourceLimitsConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            mode: "read_only".to_string(),
            allowed_operations: vec!["SELECT".to_string()],
            forbidden_keywords: vec![
                "DROP".to_string(),
                "DELETE".to_string(),
                "TRUNCATE".to_string(),
                "UPDATE".to_string(),
                "INSERT".to_string(),
                "ALTER".to_string(),
                "GRANT".to_string(),
                "REVOKE".to_string(),
                "EXEC".to_string(),
            ],
            input_validation: InputValidationConfig::default(),
            resource_limits: ResourceLimitsConfig::default(),
        }
    }
}

/// Input validation bounds for the L1 semantic-safety stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputValidationConfig {
    /// Maximum accepted input length in bytes
    pub max_length: usize,

    /// Minimum Shannon entropy (base 2) of the input characters
    pub min_entropy: f32,

    /// Maximum Shannon entropy (base 2) of the input characters
    pub max_entropy: f32,
}

impl Default for InputValidationConfig {
    fn default() -> Self {
        InputValidationConfig {
            max_length: 10_240,
            min_entropy: 0.5,
            max_entropy: 6.0,
        }
    }
}

/// Resource ceilings enforced by the L4 guard stage and row truncation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    pub max_memory_mb: usize,
    pub max_rows: usize,
    pub max_result_size_mb: usize,
}

impl Default for ResourceLimitsConfig {
    fn default() -> Self {
        ResourceLimitsConfig {
            max_memory_mb: 512,
            max_rows: 1000,
            max_result_size_mb: 10,
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Isolation strategy: "none", "basic", or "full"
    pub isolation_level: String,

    pub timeout: TimeoutConfig,
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            isolation_level: "basic".to_string(),
            timeout: TimeoutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Timeout budget, expressed as duration strings ("10s", "500ms", "5m")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total wall-clock budget for one request
    pub total: String,

    pub query_execute: String,
    pub result_scan: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            total: "10s".to_string(),
            query_execute: "5s".to_string(),
            result_scan: "3s".to_string(),
        }
    }
}

/// Retry policy - a declared contract for callers and backend-access layers.
/// The core never retries; it only parses and validates this section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: usize,
    pub initial_backoff: String,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            enabled: false,
            max_attempts: 3,
            initial_backoff: "100ms".to_string(),
            backoff_multiplier: 2.0,
        }
    }
}

/// Template registry growth bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Maximum number of fingerprint → template mappings kept
    pub max_patterns: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig { max_patterns: 5000 }
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Maximum number of cached results
    pub size: usize,

    /// Entry time-to-live as a duration string
    pub ttl: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            size: 1000,
            ttl: "5m".to_string(),
        }
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub level: String,
    pub storage: AuditStorageConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: true,
            level: "info".to_string(),
            storage: AuditStorageConfig::default(),
        }
    }
}

/// Where audit entries land; "file" writes per-day JSON-line partitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditStorageConfig {
    /// "file" or "console"; file is the only implemented sink, so
    /// "console" is accepted but currently routes to it as well
    pub r#type: String,
    pub path: String,
}

impl Default for AuditStorageConfig {
    fn default() -> Self {
        AuditStorageConfig {
            r#type: "file".to_string(),
            path: "./audit".to_string(),
        }
    }
}

/// Performance knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// When true, audit entries go through the bounded background queue
    pub async_processing: bool,

    pub compression: CompressionConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            async_processing: true,
            compression: CompressionConfig::default(),
        }
    }
}

/// Compression of encoded result buffers larger than 1 KiB
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub algorithm: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            enabled: true,
            algorithm: "zlib".to_string(),
        }
    }
}

/// Logging configuration (consumed by the binary's tracing setup)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig::default(),
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            execution: ExecutionConfig::default(),
            evolution: EvolutionConfig::default(),
            cache: CacheConfig::default(),
            audit: AuditConfig::default(),
            performance: PerformanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (QUERYGUARD_* prefix)
    pub fn load() -> Result<Self, ConfigError> {
        let config: Config = Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("QUERYGUARD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUERYGUARD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation of the loaded configuration
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.app.name.is_empty() {
            issues.push("app.name cannot be empty".to_string());
        }
        if self.app.version.is_empty() {
            issues.push("app.version cannot be empty".to_string());
        }
        if self.database.driver.is_empty() {
            issues.push("database.driver cannot be empty".to_string());
        }

        match self.security.mode.as_str() {
            "read_only" | "read_write" | "restricted" => {}
            other => issues.push(format!(
                "security.mode must be read_only, read_write, or restricted (got '{other}')"
            )),
        }
        let validation = &self.security.input_validation;
        if validation.min_entropy < 0.0 || validation.max_entropy < 0.0 {
            issues.push("security.input_validation entropy bounds must be non-negative".to_string());
        }
        if validation.min_entropy > validation.max_entropy {
            issues.push("security.input_validation.min_entropy exceeds max_entropy".to_string());
        }
        if validation.max_length == 0 {
            issues.push("security.input_validation.max_length must be positive".to_string());
        }
        let limits = &self.security.resource_limits;
        if limits.max_rows == 0 {
            issues.push("security.resource_limits.max_rows must be positive".to_string());
        }
        if limits.max_memory_mb == 0 {
            issues.push("security.resource_limits.max_memory_mb must be positive".to_string());
        }

        match self.execution.isolation_level.as_str() {
            "none" | "basic" | "full" => {}
            other => issues.push(format!(
                "execution.isolation_level must be none, basic, or full (got '{other}')"
            )),
        }
        if parse_duration(&self.execution.timeout.total).is_none() {
            issues.push(format!(
                "execution.timeout.total is not a valid duration: '{}'",
                self.execution.timeout.total
            ));
        }

        if self.evolution.max_patterns == 0 {
            issues.push("evolution.max_patterns must be positive".to_string());
        }

        if self.cache.enabled {
            if self.cache.size == 0 {
                issues.push("cache.size must be positive when the cache is enabled".to_string());
            }
            if parse_duration(&self.cache.ttl).is_none() {
                issues.push(format!("cache.ttl is not a valid duration: '{}'", self.cache.ttl));
            }
        }

        if self.audit.enabled {
            match self.audit.storage.r#type.as_str() {
                "file" | "console" => {}
                other => issues.push(format!(
                    "audit.storage.type must be file or console (got '{other}')"
                )),
            }
            if self.audit.storage.path.is_empty() {
                issues.push("audit.storage.path cannot be empty".to_string());
            }
        }

        if self.performance.compression.enabled
            && self.performance.compression.algorithm != "zlib"
        {
            issues.push(format!(
                "performance.compression.algorithm must be zlib (got '{}')",
                self.performance.compression.algorithm
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }
}

/// Parse a lenient duration string: "300ms", "10s", "5m", "1h", or a bare
/// number of seconds. Returns `None` for anything unparsable; callers fall
/// back to their hard-coded defaults.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (value, scale_ms) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1.0)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000.0)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000.0)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000.0)
    } else {
        (s, 1_000.0)
    };
    let value: f64 = value.trim().parse().ok()?;
    if value < 0.0 || !value.is_finite() {
        return None;
    }
    Some(Duration::from_millis((value * scale_ms) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("-3s"), None);
    }

    #[test]
    fn validate_rejects_bad_mode() {
        let mut config = Config::default();
        config.security.mode = "yolo".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("security.mode"));
    }

    #[test]
    fn audit_storage_type_accepts_file_and_console_only() {
        let mut config = Config::default();
        config.audit.storage.r#type = "console".to_string();
        assert!(config.validate().is_ok());
        config.audit.storage.r#type = "sqlite".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("audit.storage.type"));
    }

    #[test]
    fn validate_rejects_inverted_entropy_bounds() {
        let mut config = Config::default();
        config.security.input_validation.min_entropy = 5.0;
        config.security.input_validation.max_entropy = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_collects_multiple_issues() {
        let mut config = Config::default();
        config.security.mode = "bogus".to_string();
        config.execution.isolation_level = "paranoid".to_string();
        config.cache.ttl = "whenever".to_string();
        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("security.mode"));
        assert!(msg.contains("isolation_level"));
        assert!(msg.contains("cache.ttl"));
    }
}
