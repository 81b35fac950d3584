//! Configuration management

use anyhow::Result;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file, created if missing
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "ip_tracker.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default = "default_geo_base_url")]
    pub base_url: String,
    /// Appended as `?token=` when set
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_geo_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            base_url: default_geo_base_url(),
            api_token: None,
            timeout_secs: default_geo_timeout_secs(),
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

fn default_geo_base_url() -> String {
    "https://ipinfo.io".to_string()
}

fn default_geo_timeout_secs() -> u64 {
    5
}

fn default_cache_ttl_hours() -> i64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    /// Run detection from inside the server process
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Trailing window scanned by each run
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,
    /// Addresses with strictly more requests than this in the window are flagged
    #[serde(default = "default_request_threshold")]
    pub request_threshold: i64,
    #[serde(default = "default_sensitive_paths")]
    pub sensitive_paths: Vec<String>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            window_secs: default_window_secs(),
            request_threshold: default_request_threshold(),
            sensitive_paths: default_sensitive_paths(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_window_secs() -> i64 {
    3600
}

fn default_request_threshold() -> i64 {
    100
}

fn default_sensitive_paths() -> Vec<String> {
    ["/admin", "/login", "/admin/", "/login/"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_anonymous_rule")]
    pub anonymous: RateRule,
    #[serde(default = "default_authenticated_rule")]
    pub authenticated: RateRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anonymous: default_anonymous_rule(),
            authenticated: default_authenticated_rule(),
        }
    }
}

/// One fixed-window rule: `requests` per `window_secs`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateRule {
    pub requests: u32,
    pub window_secs: u64,
    /// Reject with 429 when exceeded; otherwise only mark the request
    #[serde(default = "default_true")]
    pub block: bool,
}

fn default_anonymous_rule() -> RateRule {
    RateRule {
        requests: 5,
        window_secs: 60,
        block: true,
    }
}

fn default_authenticated_rule() -> RateRule {
    RateRule {
        requests: 10,
        window_secs: 60,
        block: true,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<ApiUser>,
}

/// Bearer token accepted as an authenticated identity
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("IP_TRACKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("IP_TRACKER").separator("__"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.http_port == 0 {
            anyhow::bail!("Invalid http_port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.geolocation.base_url.is_empty() {
            anyhow::bail!("Geolocation base_url cannot be empty");
        }
        if self.geolocation.timeout_secs == 0 {
            anyhow::bail!("Geolocation timeout_secs must be greater than 0");
        }
        if self.geolocation.cache_ttl_hours <= 0 {
            anyhow::bail!("Geolocation cache_ttl_hours must be greater than 0");
        }

        if self.anomaly.interval_secs == 0 || self.anomaly.window_secs <= 0 {
            anyhow::bail!("Anomaly interval_secs and window_secs must be greater than 0");
        }

        for (name, rule) in [
            ("anonymous", &self.rate_limit.anonymous),
            ("authenticated", &self.rate_limit.authenticated),
        ] {
            if rule.requests == 0 || rule.window_secs == 0 {
                anyhow::bail!("Rate limit '{}' needs non-zero requests and window_secs", name);
            }
        }

        if self.auth.users.iter().any(|u| u.token.is_empty()) {
            anyhow::bail!("Auth user tokens cannot be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geolocation.timeout_secs, 5);
        assert_eq!(config.geolocation.cache_ttl_hours, 24);
        assert_eq!(config.anomaly.request_threshold, 100);
        assert_eq!(config.anomaly.interval_secs, 3600);
        assert_eq!(config.anomaly.sensitive_paths.len(), 4);
    }

    #[test]
    fn rejects_zero_port_and_bad_level() {
        let mut config = Config::default();
        config.server.http_port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_rate_rule() {
        let mut config = Config::default();
        config.rate_limit.authenticated.requests = 0;
        assert!(config.validate().is_err());
    }
}
