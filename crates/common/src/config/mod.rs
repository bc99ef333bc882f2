//! Configuration management for ScholarGraph
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{EngineError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Retrieval and ranking configuration
    pub retrieval: RetrievalConfig,

    /// Live-fetch controller configuration
    pub live_fetch: LiveFetchConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// External works API configuration
    pub works: WorksConfig,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

/// Combiner weights over the four ranking signals.
///
/// Non-negative and summing to 1; validated on load.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Weights {
    #[serde(default = "default_weight_semantic")]
    pub semantic: f64,

    #[serde(default = "default_weight_alignment")]
    pub alignment: f64,

    #[serde(default = "default_weight_authority")]
    pub authority: f64,

    #[serde(default = "default_weight_centrality")]
    pub centrality: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            semantic: default_weight_semantic(),
            alignment: default_weight_alignment(),
            authority: default_weight_authority(),
            centrality: default_weight_centrality(),
        }
    }
}

impl Weights {
    /// Validate weight invariants: non-negative, summing to 1.
    pub fn validate(&self) -> Result<()> {
        let components = [self.semantic, self.alignment, self.authority, self.centrality];
        if components.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::Configuration {
                message: "combiner weights must be finite and non-negative".into(),
            });
        }
        let sum: f64 = components.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::Configuration {
                message: format!("combiner weights must sum to 1.0, got {sum}"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Nearest chunks requested per semantic pass
    #[serde(default = "default_top_k_chunks")]
    pub top_k_chunks: usize,

    /// Hop limit for graph expansion
    #[serde(default = "default_hop_limit")]
    pub hop_limit: u32,

    /// Newly visited neighbors admitted per hop
    #[serde(default = "default_fanout_cap")]
    pub fanout_cap: usize,

    /// Snippet length cap in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,

    /// Combiner weights
    #[serde(default)]
    pub weights: Weights,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveFetchConfig {
    /// Master switch for the live-fetch controller
    #[serde(default = "default_live_fetch_enabled")]
    pub enabled: bool,

    /// Local result count at or above which no fetch is attempted
    #[serde(default = "default_min_local_results")]
    pub min_local_results: usize,

    /// Works requested per fetch
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    /// Minimum seconds between two fetches for the same scope
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// End-to-end fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl LiveFetchConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hash
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorksConfig {
    /// Works API base URL
    #[serde(default = "default_works_base_url")]
    pub base_url: String,

    /// API key; live fetch is reported missing_api_key when unset
    pub api_key: Option<String>,

    /// Contact address passed through to the polite pool
    pub mailto: Option<String>,

    /// Page size per upstream request
    #[serde(default = "default_works_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_works_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_works_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum cached responses
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_page_size() -> u32 {
    10
}
fn default_top_k_chunks() -> usize {
    2000
}
fn default_hop_limit() -> u32 {
    2
}
fn default_fanout_cap() -> usize {
    32
}
fn default_snippet_max_chars() -> usize {
    220
}
fn default_weight_semantic() -> f64 {
    0.40
}
fn default_weight_alignment() -> f64 {
    0.25
}
fn default_weight_authority() -> f64 {
    0.20
}
fn default_weight_centrality() -> f64 {
    0.15
}
fn default_live_fetch_enabled() -> bool {
    true
}
fn default_min_local_results() -> usize {
    10
}
fn default_fetch_limit() -> u32 {
    40
}
fn default_cooldown_secs() -> u64 {
    900
}
fn default_fetch_timeout_secs() -> u64 {
    25
}
fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dimension() -> usize {
    768
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_works_base_url() -> String {
    "https://api.openalex.org".to_string()
}
fn default_works_page_size() -> u32 {
    200
}
fn default_works_timeout() -> u64 {
    15
}
fn default_works_retries() -> u32 {
    3
}
fn default_cache_capacity() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_service_name() -> String {
    "scholargraph".to_string()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__LIVE_FETCH__COOLDOWN_SECS=60
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate cross-field invariants not expressible as serde defaults.
    pub fn validate(&self) -> Result<()> {
        self.retrieval.weights.validate()?;

        if self.retrieval.page_size == 0 {
            return Err(EngineError::Configuration {
                message: "retrieval.page_size must be greater than zero".into(),
            });
        }
        if self.retrieval.top_k_chunks == 0 {
            return Err(EngineError::Configuration {
                message: "retrieval.top_k_chunks must be greater than zero".into(),
            });
        }
        if self.retrieval.fanout_cap == 0 {
            return Err(EngineError::Configuration {
                message: "retrieval.fanout_cap must be greater than zero".into(),
            });
        }
        if self.live_fetch.min_local_results == 0 {
            return Err(EngineError::Configuration {
                message: "live_fetch.min_local_results must be greater than zero".into(),
            });
        }
        if self.live_fetch.fetch_limit == 0 {
            return Err(EngineError::Configuration {
                message: "live_fetch.fetch_limit must be greater than zero".into(),
            });
        }
        if self.cache.capacity == 0 {
            return Err(EngineError::Configuration {
                message: "cache.capacity must be greater than zero".into(),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(EngineError::Configuration {
                message: "embedding.dimension must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig {
                page_size: default_page_size(),
                top_k_chunks: default_top_k_chunks(),
                hop_limit: default_hop_limit(),
                fanout_cap: default_fanout_cap(),
                snippet_max_chars: default_snippet_max_chars(),
                weights: Weights::default(),
            },
            live_fetch: LiveFetchConfig {
                enabled: default_live_fetch_enabled(),
                min_local_results: default_min_local_results(),
                fetch_limit: default_fetch_limit(),
                cooldown_secs: default_cooldown_secs(),
                timeout_secs: default_fetch_timeout_secs(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
            },
            works: WorksConfig {
                base_url: default_works_base_url(),
                api_key: None,
                mailto: None,
                page_size: default_works_page_size(),
                timeout_secs: default_works_timeout(),
                max_retries: default_works_retries(),
            },
            cache: CacheConfig {
                capacity: default_cache_capacity(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                service_name: default_service_name(),
            },
        }
    }
}
