//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Hosted data service connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Query cache behavior
    #[serde(default)]
    pub cache: CacheConfig,

    /// Public site identity used for SEO output
    #[serde(default)]
    pub site: SiteConfig,

    /// HTTP server binding
    #[serde(default)]
    pub server: ServerConfig,

    /// Comment submission limits
    #[serde(default)]
    pub comments: CommentsConfig,

    /// SEO backfill settings
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let backend_url = Url::parse(&self.backend.url)
            .map_err(|e| AppError::validation(format!("backend.url is invalid: {e}")))?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            return Err(AppError::validation("backend.url must be http(s)"));
        }
        if self.backend.anon_key.trim().is_empty() {
            return Err(AppError::validation("backend.anon_key is empty"));
        }
        if self.backend.user_agent.trim().is_empty() {
            return Err(AppError::validation("backend.user_agent is empty"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(AppError::validation("backend.timeout_secs must be > 0"));
        }
        Url::parse(&self.site.url)
            .map_err(|e| AppError::validation(format!("site.url is invalid: {e}")))?;
        if self.server.port == 0 {
            return Err(AppError::validation("server.port must be > 0"));
        }
        if self.comments.max_length == 0 {
            return Err(AppError::validation("comments.max_length must be > 0"));
        }
        if self.migration.max_concurrent == 0 {
            return Err(AppError::validation("migration.max_concurrent must be > 0"));
        }
        Ok(())
    }
}

/// Hosted backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project base URL (REST lives under `/rest/v1`, auth under `/auth/v1`)
    #[serde(default = "defaults::backend_url")]
    pub url: String,

    /// Public anonymous API key
    #[serde(default)]
    pub anon_key: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: defaults::backend_url(),
            anon_key: String::new(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Query cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which a cached query is refetched
    #[serde(default = "defaults::stale_time")]
    pub stale_time_secs: u64,

    /// Entries not read for this long are dropped
    #[serde(default = "defaults::gc_time")]
    pub gc_time_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "defaults::retry")]
    pub retry: u32,

    /// First retry delay in milliseconds, doubled on each attempt
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single retry delay in milliseconds
    #[serde(default = "defaults::retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_secs(self.gc_time_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: defaults::stale_time(),
            gc_time_secs: defaults::gc_time(),
            retry: defaults::retry(),
            retry_base_delay_ms: defaults::retry_base_delay(),
            retry_max_delay_ms: defaults::retry_max_delay(),
        }
    }
}

/// Public site identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "defaults::site_name")]
    pub name: String,

    #[serde(default = "defaults::site_description")]
    pub description: String,

    /// Canonical origin, e.g. `https://reviewa2z.com`
    #[serde(default = "defaults::site_url")]
    pub url: String,

    #[serde(default = "defaults::og_image")]
    pub og_image: String,

    /// Keywords used when a page has no content to derive them from
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,
}

impl SiteConfig {
    /// Site origin without a trailing slash.
    pub fn origin(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: defaults::site_name(),
            description: defaults::site_description(),
            url: defaults::site_url(),
            og_image: defaults::og_image(),
            keywords: defaults::keywords(),
        }
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::host")]
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Origins allowed by CORS; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Comment submission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsConfig {
    /// Maximum comment length in characters
    #[serde(default = "defaults::comment_max_length")]
    pub max_length: usize,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            max_length: defaults::comment_max_length(),
        }
    }
}

/// SEO backfill settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Maximum concurrent row updates
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output (server only)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            json: false,
        }
    }
}

mod defaults {
    // Backend defaults
    pub fn backend_url() -> String {
        "http://localhost:54321".into()
    }
    pub fn user_agent() -> String {
        "reviewa2z/0.1".into()
    }
    pub fn timeout() -> u64 {
        15
    }

    // Cache defaults
    pub fn stale_time() -> u64 {
        30
    }
    pub fn gc_time() -> u64 {
        300
    }
    pub fn retry() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        1_000
    }
    pub fn retry_max_delay() -> u64 {
        30_000
    }

    // Site defaults
    pub fn site_name() -> String {
        "ReviewA2Z".into()
    }
    pub fn site_description() -> String {
        "AI-Powered Product Reviews and Comparisons - Get unbiased, in-depth analysis of products before making your purchase decision.".into()
    }
    pub fn site_url() -> String {
        "https://reviewa2z.com".into()
    }
    pub fn og_image() -> String {
        "/og-image.jpg".into()
    }
    pub fn keywords() -> Vec<String> {
        [
            "product reviews",
            "AI reviews",
            "unbiased reviews",
            "product comparisons",
            "smart shopping",
            "product analysis",
            "buying guide",
            "tech reviews",
            "consumer reviews",
            "trusted reviews",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    // Server defaults
    pub fn host() -> String {
        "0.0.0.0".into()
    }
    pub fn port() -> u16 {
        8080
    }

    pub fn comment_max_length() -> usize {
        2_000
    }

    pub fn max_concurrent() -> usize {
        5
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.backend.anon_key = "public-anon-key".to_string();
        config
    }

    #[test]
    fn validate_default_config_with_key_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_anon_key() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_backend() {
        let mut config = valid_config();
        config.backend.url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = valid_config();
        config.backend.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            url = "https://project.supabase.co"
            anon_key = "key"

            [cache]
            stale_time_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.url, "https://project.supabase.co");
        assert_eq!(config.cache.stale_time_secs, 60);
        assert_eq!(config.cache.retry, 3);
        assert_eq!(config.site.name, "ReviewA2Z");
        assert_eq!(config.site.keywords.len(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn site_origin_strips_trailing_slash() {
        let mut site = SiteConfig::default();
        site.url = "https://example.com/".to_string();
        assert_eq!(site.origin(), "https://example.com");
    }
}
