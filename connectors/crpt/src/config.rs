//! CRPT connector configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crpt_ratelimit::{RateLimitConfig, TimeUnit, WindowStrategy};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CrptError, CrptResult};

/// Environment variable overriding the bearer token.
pub const TOKEN_ENV: &str = "CRPT_TOKEN";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "CRPT_BASE_URL";

/// Configuration for the CRPT connector.
#[derive(Clone, Serialize, Deserialize)]
pub struct CrptConfig {
    /// Base URL of the registry (default: https://markirovka.crpt.ru)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Product group the documents belong to (e.g. `lp`)
    pub product_group: String,

    /// Bearer token
    #[serde(default)]
    pub token: String,

    /// Request timeout
    #[serde(default = "default_timeout", rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,

    /// Submission quota
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

fn default_base_url() -> String {
    "https://markirovka.crpt.ru".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Submission quota: `request_limit` per `time_unit` (or per `window_ms`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum submissions per window
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,

    /// Window length as one unit of time
    #[serde(default)]
    pub time_unit: TimeUnit,

    /// Explicit window length in milliseconds, overrides `time_unit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,

    /// Window algorithm
    #[serde(default)]
    pub strategy: WindowStrategy,
}

fn default_request_limit() -> u32 {
    10
}

impl RateLimitSettings {
    /// Effective window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window_ms
            .map_or_else(|| self.time_unit.duration(), Duration::from_millis)
    }

    /// Limiter configuration for these settings.
    #[must_use]
    pub fn to_limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.request_limit, self.window()).with_strategy(self.strategy)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            request_limit: default_request_limit(),
            time_unit: TimeUnit::default(),
            window_ms: None,
            strategy: WindowStrategy::default(),
        }
    }
}

impl CrptConfig {
    /// Minimal configuration; everything else takes its default.
    #[must_use]
    pub fn new(product_group: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            product_group: product_group.into(),
            token: token.into(),
            timeout: default_timeout(),
            rate_limit: RateLimitSettings::default(),
        }
    }

    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the submission quota.
    #[must_use]
    pub fn with_rate_limit(mut self, request_limit: u32, window: Duration) -> Self {
        self.rate_limit.request_limit = request_limit;
        self.rate_limit.window_ms = Some(u64::try_from(window.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parse a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the TOML does not describe a configuration.
    pub fn from_toml_str(input: &str) -> CrptResult<Self> {
        toml::from_str(input).map_err(|e| CrptError::Config(e.to_string()))
    }

    /// Read a TOML configuration file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed, or the result
    /// does not validate.
    pub fn load(path: impl AsRef<Path>) -> CrptResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| CrptError::Config(format!("{}: {e}", path.display())))?;

        let mut config = Self::from_toml_str(&input)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Take the token and base URL from the environment when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                self.token = token;
            }
        }
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.is_empty() {
                self.base_url = base_url;
            }
        }
    }

    /// Check the configuration before building a client.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid setting.
    pub fn validate(&self) -> CrptResult<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| CrptError::Config(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CrptError::Config(format!(
                "base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.product_group.trim().is_empty() {
            return Err(CrptError::Config("product_group is empty".into()));
        }
        if self.token.trim().is_empty() {
            return Err(CrptError::Config(format!(
                "token is empty (set it in the config or {TOKEN_ENV})"
            )));
        }
        self.rate_limit.to_limiter_config().validate()?;
        Ok(())
    }
}

impl fmt::Debug for CrptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrptConfig")
            .field("base_url", &self.base_url)
            .field("product_group", &self.product_group)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crpt_ratelimit::RateLimiter;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let config = CrptConfig::from_toml_str(
            r#"
            base_url = "https://ismp.crpt.ru"
            product_group = "lp"
            token = "secret"
            timeout_secs = 5

            [rate_limit]
            request_limit = 3
            time_unit = "minute"
            strategy = "sliding"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://ismp.crpt.ru");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limit.request_limit, 3);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.strategy, WindowStrategy::Sliding);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = CrptConfig::from_toml_str("product_group = \"lp\"\ntoken = \"t\"").unwrap();

        assert_eq!(config.base_url, "https://markirovka.crpt.ru");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limit.request_limit, 10);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(1));
        assert_eq!(config.rate_limit.strategy, WindowStrategy::Fixed);
    }

    #[test]
    fn test_window_ms_overrides_time_unit() {
        let config = CrptConfig::from_toml_str(
            "product_group = \"lp\"\ntoken = \"t\"\n[rate_limit]\ntime_unit = \"hour\"\nwindow_ms = 1500\n",
        )
        .unwrap();
        assert_eq!(config.rate_limit.window(), Duration::from_millis(1500));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let ok = CrptConfig::new("lp", "token");
        ok.validate().unwrap();

        assert!(CrptConfig::new("lp", "").validate().is_err());
        assert!(CrptConfig::new(" ", "token").validate().is_err());
        assert!(
            CrptConfig::new("lp", "token")
                .with_base_url("ftp://example.com")
                .validate()
                .is_err()
        );
        assert!(
            CrptConfig::new("lp", "token")
                .with_rate_limit(0, Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_max_sliding_limit_builds() {
        let config = CrptConfig::from_toml_str(
            r#"
            product_group = "lp"
            token = "t"

            [rate_limit]
            request_limit = 4294967295
            strategy = "sliding"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        let limiter = config.rate_limit.to_limiter_config().build().unwrap();
        assert_eq!(limiter.remaining(), u32::MAX);
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", CrptConfig::new("lp", "super-secret-token"));
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "base_url = \"http://127.0.0.1:9\"\nproduct_group = \"lp\"\ntoken = \"file-token\""
        )
        .unwrap();

        let config = CrptConfig::load(file.path()).unwrap();
        assert_eq!(config.product_group, "lp");
    }

    #[test]
    fn test_load_missing_file() {
        let err = CrptConfig::load("/nonexistent/crpt.toml").unwrap_err();
        assert!(matches!(err, CrptError::Config(_)));
    }
}
