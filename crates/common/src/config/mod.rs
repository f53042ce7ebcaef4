//! Configuration management for MedVault services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Object storage configuration
    pub storage: StorageConfig,

    /// Inference provider configuration
    pub inference: InferenceConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Upload policy
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Analysis lifecycle tuning
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes); `memory://` selects the in-process store
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending migrations on startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage provider: s3, memory
    #[serde(default = "default_storage_provider")]
    pub provider: String,

    /// Bucket holding patient documents
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Region for the S3 client
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    pub endpoint: Option<String>,

    /// Lifetime of signed upload URLs in seconds
    #[serde(default = "default_upload_url_ttl")]
    pub upload_url_ttl_secs: u64,

    /// Lifetime of signed download URLs in seconds
    #[serde(default = "default_download_url_ttl")]
    pub download_url_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Inference provider: huggingface, mock
    #[serde(default = "default_inference_provider")]
    pub provider: String,

    /// API token for the provider
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_inference_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Maximum generated tokens
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// First admin created at startup when no admin exists
    pub bootstrap_admin_email: Option<String>,

    /// Password for the bootstrap admin
    pub bootstrap_admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_size_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Processing records older than this are demoted to failed
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Interval between sweeps (0 disables the sweeper)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum characters of extracted document text included in a prompt
    #[serde(default = "default_excerpt_chars")]
    pub prompt_excerpt_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 90 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_provider() -> String { "s3".to_string() }
fn default_bucket() -> String { "medvault-documents".to_string() }
fn default_upload_url_ttl() -> u64 { 900 }
fn default_download_url_ttl() -> u64 { 3600 }
fn default_inference_provider() -> String { "huggingface".to_string() }
fn default_inference_model() -> String { "mistralai/Mistral-7B-Instruct-v0.2".to_string() }
fn default_inference_timeout() -> u64 { 30 }
fn default_max_new_tokens() -> u32 { 500 }
fn default_temperature() -> f32 { 0.3 }
fn default_jwt_expiration() -> u64 { 86_400 }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_max_upload_bytes() -> u64 { 10 * 1024 * 1024 }
fn default_stale_after() -> u64 { 900 }
fn default_sweep_interval() -> u64 { 60 }
fn default_excerpt_chars() -> usize { 4000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "medvault".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
            sweep_interval_secs: default_sweep_interval(),
            prompt_excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl AnalysisConfig {
    /// Age after which a processing record is considered abandoned
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "memory://")?
            .set_default("storage.provider", default_storage_provider())?
            .set_default("inference.provider", default_inference_provider())?
            .set_default("auth.jwt_expiration_secs", default_jwt_expiration())?
            .set_default("observability.log_level", default_log_level())?
            .set_default("rate_limit.enabled", true)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks serde cannot express.
    ///
    /// A processing record may only be swept once no live request or
    /// inference call can still be working on it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stale_after = self.analysis.stale_after_secs;
        let longest = self.inference.timeout_secs.max(self.server.request_timeout_secs);
        if stale_after <= longest {
            return Err(ConfigError::Message(format!(
                "analysis.stale_after_secs ({}) must exceed inference and request timeouts ({}s)",
                stale_after, longest
            )));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get inference timeout as Duration
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference.timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Whether the in-process record store is selected
    pub fn uses_memory_store(&self) -> bool {
        self.database.url.starts_with("memory://")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "memory://".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: default_enabled(),
            },
            storage: StorageConfig {
                provider: "memory".to_string(),
                bucket: default_bucket(),
                region: None,
                endpoint: None,
                upload_url_ttl_secs: default_upload_url_ttl(),
                download_url_ttl_secs: default_download_url_ttl(),
            },
            inference: InferenceConfig {
                provider: "mock".to_string(),
                api_key: None,
                api_base: None,
                model: default_inference_model(),
                timeout_secs: default_inference_timeout(),
                max_new_tokens: default_max_new_tokens(),
                temperature: default_temperature(),
            },
            auth: AuthConfig {
                jwt_secret: None,
                jwt_expiration_secs: default_jwt_expiration(),
                request_id_header: default_request_id_header(),
                bootstrap_admin_email: None,
                bootstrap_admin_password: None,
            },
            uploads: UploadConfig::default(),
            analysis: AnalysisConfig::default(),
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}
