//! Memoria configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main Memoria configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term hot cache configuration
    pub hot_cache: HotCacheConfig,

    /// Namespace authorizer configuration
    pub authorizer: AuthorizerConfig,

    /// Distributed lock configuration
    pub locks: LockConfig,

    /// Reflection engine configuration
    pub reflection: ReflectionConfig,

    /// Embedding service (None = caller supplies a provider)
    pub embedding: Option<EmbeddingConfig>,

    /// Redis URL for the lock/cache store
    pub redis_url: Option<String>,
}

impl MemoryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config location (`~/.memoria/config.toml`)
    pub fn default_path() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memoria")
            .join("config.toml")
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.hot_cache.capacity == 0 {
            return Err(Error::Config("hot_cache.capacity must be > 0".to_string()));
        }
        if self.authorizer.cache_capacity == 0 {
            return Err(Error::Config(
                "authorizer.cache_capacity must be > 0".to_string(),
            ));
        }
        if self.locks.ttl_secs == 0 {
            return Err(Error::Config("locks.ttl_secs must be > 0".to_string()));
        }
        if self.locks.stats_ttl_secs == 0 {
            return Err(Error::Config("locks.stats_ttl_secs must be > 0".to_string()));
        }

        let r = &self.reflection;
        if !(r.min_activation < r.max_activation) {
            return Err(Error::Config(format!(
                "reflection.min_activation ({}) must be below max_activation ({})",
                r.min_activation, r.max_activation
            )));
        }
        if !(r.decay_rate > 0.0 && r.decay_rate < 1.0) {
            return Err(Error::Config(format!(
                "reflection.decay_rate ({}) must be in (0, 1)",
                r.decay_rate
            )));
        }
        if r.boost_per_access <= 0.0 {
            return Err(Error::Config(
                "reflection.boost_per_access must be positive".to_string(),
            ));
        }
        if r.core_identity_threshold > r.max_activation {
            return Err(Error::Config(
                "reflection.core_identity_threshold exceeds max_activation".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotCacheConfig {
    /// Ring buffer capacity per (user, namespace)
    pub capacity: usize,

    /// Minimum wall-clock duration of a search call
    pub search_floor_ms: u64,

    /// Default number of results
    pub default_top_k: usize,

    /// Default minimum cosine similarity
    pub default_threshold: f32,

    /// Deadline for a single embedding call
    pub embed_timeout_ms: u64,
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            search_floor_ms: 50,
            default_top_k: 5,
            default_threshold: 0.3,
            embed_timeout_ms: 5_000,
        }
    }
}

impl HotCacheConfig {
    pub fn search_floor(&self) -> Duration {
        Duration::from_millis(self.search_floor_ms)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }
}

/// Namespace authorizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizerConfig {
    /// Maximum cached decisions
    pub cache_capacity: usize,

    /// Decision lifetime in seconds
    pub cache_ttl_secs: u64,

    /// Minimum wall-clock duration of every authorization call
    pub timing_floor_ms: u64,

    /// Deadline for a directory lookup
    pub lookup_timeout_ms: u64,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 500,
            cache_ttl_secs: 300,
            timing_floor_ms: 50,
            lookup_timeout_ms: 5_000,
        }
    }
}

impl AuthorizerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timing_floor(&self) -> Duration {
        Duration::from_millis(self.timing_floor_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Distributed lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock expiry in seconds
    pub ttl_secs: u64,

    /// Prefix for every lock key, separating deployments sharing one store
    pub key_prefix: String,

    /// Lifetime of per-cycle lock outcome counters
    pub stats_ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            key_prefix: "memoria".to_string(),
            stats_ttl_secs: 86_400,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }
}

/// Reflection engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Seconds between cycles when run in the background
    pub interval_secs: u64,

    /// Deadline for one module within a cycle
    pub module_timeout_secs: u64,

    /// Activation floor
    pub min_activation: f64,

    /// Activation ceiling
    pub max_activation: f64,

    /// Activation added per boost
    pub boost_per_access: f64,

    /// Fraction of activation lost per idle day
    pub decay_rate: f64,

    /// Activation at which a node is pinned to the ceiling
    pub core_identity_threshold: f64,

    /// Nodes need strictly more accesses than this to be boosted
    pub boost_min_access_count: u64,

    /// Maximum nodes boosted per cycle
    pub boost_limit: usize,

    /// Maximum core-knowledge nodes considered by synthesis
    pub core_knowledge_limit: usize,

    /// Activation required to count as core knowledge
    pub core_knowledge_min_activation: f64,

    /// Minimum evaluator confidence for an insight to be kept
    pub insight_min_confidence: f64,

    /// Activation given to newly synthesized insights
    pub insight_initial_activation: f64,

    /// Maximum transcript keys scanned per cycle
    pub transcript_scan_limit: usize,

    /// Occurrences needed for a temporal pattern
    pub temporal_min_occurrences: usize,

    /// Occurrences needed for a sequence pattern
    pub sequence_min_occurrences: usize,

    /// Confidence needed for a pattern to raise a proactive alert
    pub scheduled_min_confidence: f64,

    /// Edge types allowed at most one current edge per source node
    pub functional_edge_types: Vec<String>,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            module_timeout_secs: 60,
            min_activation: 0.01,
            max_activation: 1.0,
            boost_per_access: 0.1,
            decay_rate: 0.05,
            core_identity_threshold: 0.95,
            boost_min_access_count: 5,
            boost_limit: 50,
            core_knowledge_limit: 20,
            core_knowledge_min_activation: 0.6,
            insight_min_confidence: 0.6,
            insight_initial_activation: 0.8,
            transcript_scan_limit: 1_000,
            temporal_min_occurrences: 3,
            sequence_min_occurrences: 2,
            scheduled_min_confidence: 0.7,
            functional_edge_types: default_functional_edge_types(),
        }
    }
}

impl ReflectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn module_timeout(&self) -> Duration {
        Duration::from_secs(self.module_timeout_secs)
    }

    /// Clamp an activation value into the configured bounds
    pub fn clamp_activation(&self, value: f64) -> f64 {
        value.clamp(self.min_activation, self.max_activation)
    }
}

/// Default functional edge types
pub fn default_functional_edge_types() -> Vec<String> {
    ["partner_is", "lives_in", "works_at", "has_name", "born_on"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// OpenAI-compatible embedding endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Embedding model name
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request deadline
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_key_env() -> String {
    "MEMORIA_EMBEDDING_API_KEY".to_string()
}

fn default_embedding_timeout_ms() -> u64 {
    5_000
}
