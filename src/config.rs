//! Configuration for the recipe streaming client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding the backend base URL
pub const BASE_URL_ENV: &str = "RECIPE_STREAM_BASE_URL";

/// Environment variable holding annotations applied to every extraction
pub const STANDARD_ANNOTATIONS_ENV: &str = "RECIPE_STREAM_STANDARD_ANNOTATIONS";

/// Configuration for the recipe streaming client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeStreamConfig {
    /// Base URL of the recipe backend (can be overridden for testing)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP client configuration
    #[serde(default)]
    pub http_config: HttpConfig,

    /// Annotations sent with every recipe extraction, ahead of the
    /// per-request ones
    #[serde(default)]
    pub standard_annotations: String,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout, covering the whole streamed body
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Connection timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Whether to use connection pooling
    pub pool_connections: bool,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // page fetch plus extraction can be slow
            connect_timeout: Duration::from_secs(30),
            pool_connections: true,
            pool_max_idle_per_host: 10,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:4000".to_string()
}

impl RecipeStreamConfig {
    /// Create a new configuration pointing at a backend
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Both variables are optional; unset ones keep their defaults.
    pub fn from_env() -> crate::error::Result<Self> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if base_url.trim().is_empty() {
                return Err(crate::error::Error::Config(format!(
                    "{} is set but empty",
                    BASE_URL_ENV
                )));
            }
            config.base_url = base_url;
        }

        if let Ok(annotations) = std::env::var(STANDARD_ANNOTATIONS_ENV) {
            config.standard_annotations = annotations;
        }

        Ok(config)
    }

    /// Build an endpoint URL under the backend's `/api` prefix
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Combine the standard annotations with per-request ones
    pub fn annotations_for(&self, annotations: &str) -> String {
        let standard = self.standard_annotations.trim();
        let extra = annotations.trim();

        match (standard.is_empty(), extra.is_empty()) {
            (true, _) => extra.to_string(),
            (false, true) => standard.to_string(),
            (false, false) => format!("{}\n{}", standard, extra),
        }
    }
}

impl Default for RecipeStreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            http_config: HttpConfig::default(),
            standard_annotations: String::new(),
        }
    }
}
