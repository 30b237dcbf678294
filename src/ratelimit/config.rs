use crate::utils::get_env_with_prefix;
use serde::{Deserialize, Serialize};

/// Rate limiting configuration.
///
/// The `algorithm` field is a string on purpose: dynamic overrides and
/// environment variables carry algorithm names as text, and an unknown name
/// must fail open at check time rather than fail construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of requests allowed per window
    #[serde(default = "default_requests")]
    pub requests: u32,

    /// Time window in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Algorithm name: "token_bucket", "leaky_bucket", "fixed_window" or
    /// "sliding_window"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Keys that bypass rate limiting entirely
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Record per-key denial statistics
    #[serde(default = "default_enable_stats")]
    pub enable_stats: bool,

    /// Trust X-Forwarded-For / X-Real-IP headers for client IP detection.
    ///
    /// **SECURITY WARNING**: Only enable this behind a trusted reverse proxy
    /// that overwrites (not appends to) these headers, otherwise clients can
    /// spoof their IP to bypass per-IP limits.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests: default_requests(),
            window_seconds: default_window_seconds(),
            algorithm: default_algorithm(),
            whitelist: Vec::new(),
            enable_stats: default_enable_stats(),
            trust_proxy: false,
        }
    }
}

impl RateLimitConfig {
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Permissive configuration for development: 1000 requests per minute.
    pub fn permissive() -> Self {
        Self {
            requests: 1000,
            ..Self::default()
        }
    }

    /// Restrictive configuration for production: 100 requests per minute.
    pub fn restrictive() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("RATE_LIMIT_ENABLED") {
            config.enabled = enabled.parse().unwrap_or(true);
        }

        if let Some(requests) = get_env_with_prefix("RATE_LIMIT_REQUESTS") {
            if let Ok(val) = requests.parse() {
                config.requests = val;
            }
        }

        if let Some(window) = get_env_with_prefix("RATE_LIMIT_WINDOW_SECONDS") {
            if let Ok(val) = window.parse() {
                config.window_seconds = val;
            }
        }

        if let Some(algorithm) = get_env_with_prefix("RATE_LIMIT_ALGORITHM") {
            config.algorithm = algorithm;
        }

        if let Some(whitelist) = get_env_with_prefix("RATE_LIMIT_WHITELIST") {
            config.whitelist = whitelist
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(trust_proxy) = get_env_with_prefix("RATE_LIMIT_TRUST_PROXY") {
            config.trust_proxy = trust_proxy.parse().unwrap_or(false);
        }

        config
    }
}

/// Builder for RateLimitConfig
#[must_use = "builder does nothing until you call build()"]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn requests(mut self, requests: u32) -> Self {
        self.config.requests = requests;
        self
    }

    pub fn window_seconds(mut self, seconds: u64) -> Self {
        self.config.window_seconds = seconds;
        self
    }

    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.config.algorithm = algorithm.into();
        self
    }

    pub fn whitelist(mut self, key: impl Into<String>) -> Self {
        self.config.whitelist.push(key.into());
        self
    }

    pub fn enable_stats(mut self, enable: bool) -> Self {
        self.config.enable_stats = enable;
        self
    }

    /// Trust proxy headers for client IP detection.
    ///
    /// **SECURITY WARNING**: Only enable this behind a trusted reverse proxy.
    /// See [`RateLimitConfig::trust_proxy`] for details.
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.config.trust_proxy = trust;
        self
    }

    pub fn build(self) -> RateLimitConfig {
        self.config
    }
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dynamic override of the static defaults, stored in the shared store at
/// `ratelimit:config:{endpoint}` (endpoint scope) or `ratelimit:config:global`.
///
/// Absent fields keep the static value. A record that fails to deserialize is
/// discarded and the static defaults apply; a malformed override must never
/// take down a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitOverride {
    pub requests: Option<u32>,
    pub window_seconds: Option<u64>,
    pub algorithm: Option<String>,
}

impl RateLimitOverride {
    /// Storage key for an endpoint-scoped override.
    pub fn endpoint_key(endpoint: &str) -> String {
        format!("ratelimit:config:{}", endpoint)
    }

    /// Storage key for the global override.
    pub fn global_key() -> &'static str {
        "ratelimit:config:global"
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_algorithm() -> String {
    "token_bucket".to_string()
}

fn default_enable_stats() -> bool {
    true
}
