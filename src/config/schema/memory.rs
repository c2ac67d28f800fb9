use crate::core::memory::{MergePolicy, ReinforcePolicy, UpdateRetentionPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" | "lancedb"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Storage directory; defaults to `<workspace>/memory` when unset
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Logical collection name; the physical table is `{collection}_{dimensions}`
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Embedding vector dimensions; every record in the collection must match
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// SQLite pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound for a single engine operation, in seconds
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DedupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum cosine similarity treated as a duplicate
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Neighbors inspected per candidate
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub merge_policy: MergePolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetentionConfig {
    /// Exponential decay rate per elapsed hour
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Fraction of the remaining headroom recovered per access (0, 1]
    #[serde(default = "default_reinforcement_factor")]
    pub reinforcement_factor: f64,
    #[serde(default)]
    pub reinforce_on: ReinforcePolicy,
    #[serde(default)]
    pub update_policy: UpdateRetentionPolicy,
    /// Blend of decayed strength into search ranking (0.0 keeps pure similarity)
    #[serde(default)]
    pub ranking_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hash" | "openai" | "custom:URL"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Embedding model name (e.g. "text-embedding-3-small")
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_backend() -> String {
    "sqlite".into()
}
fn default_collection() -> String {
    "memories".into()
}
fn default_dimensions() -> usize {
    1536
}
fn default_max_connections() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_threshold() -> f32 {
    0.95
}
fn default_top_k() -> usize {
    5
}
fn default_decay_rate() -> f64 {
    0.01
}
fn default_reinforcement_factor() -> f64 {
    0.2
}
fn default_embedding_provider() -> String {
    "hash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: None,
            collection: default_collection(),
            dimensions: default_dimensions(),
            max_connections: default_max_connections(),
            operation_timeout_secs: None,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_threshold(),
            top_k: default_top_k(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            reinforcement_factor: default_reinforcement_factor(),
            reinforce_on: ReinforcePolicy::default(),
            update_policy: UpdateRetentionPolicy::default(),
            ranking_weight: 0.0,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
        }
    }
}

impl StoreConfig {
    /// Physical table name: collections are keyed by name plus dimension.
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.collection, self.dimensions)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.dimensions > 0, "store.dimensions must be > 0");
        anyhow::ensure!(
            is_valid_collection_name(&self.collection),
            "store.collection must match [A-Za-z][A-Za-z0-9_]*, got '{}'",
            self.collection
        );
        anyhow::ensure!(
            self.max_connections > 0,
            "store.max_connections must be > 0"
        );
        Ok(())
    }
}

impl DedupConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.threshold.is_finite() && (-1.0..=1.0).contains(&self.threshold),
            "dedup.threshold must be within [-1, 1], got {}",
            self.threshold
        );
        anyhow::ensure!(self.top_k > 0, "dedup.top_k must be > 0");
        Ok(())
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.decay_rate.is_finite() && self.decay_rate > 0.0,
            "retention.decay_rate must be > 0, got {}",
            self.decay_rate
        );
        anyhow::ensure!(
            self.reinforcement_factor > 0.0 && self.reinforcement_factor <= 1.0,
            "retention.reinforcement_factor must be within (0, 1], got {}",
            self.reinforcement_factor
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.ranking_weight),
            "retention.ranking_weight must be within [0, 1], got {}",
            self.ranking_weight
        );
        Ok(())
    }
}

pub(crate) fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
