use crate::error::{MemoryError, MemoryResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Open key-value document attached to a memory; opaque to the store.
pub type Metadata = serde_json::Map<String, Value>;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_FILTER_KEY_LEN: usize = 128;

/// A persisted memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub user_id: String,
    pub agent_id: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retention_strength: f64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Cosine similarity to the query; only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Memory {
    pub fn scope(&self) -> Scope {
        Scope {
            user_id: self.user_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }

    /// Timestamp decay is measured from: the later of creation and last access.
    pub fn retention_anchor(&self) -> DateTime<Utc> {
        match self.last_accessed_at {
            Some(accessed) if accessed > self.created_at => accessed,
            _ => self.created_at,
        }
    }
}

/// Insert input. `id` is assigned by the store when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub id: Option<i64>,
    pub user_id: String,
    pub agent_id: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub retention_strength: f64,
}

impl NewMemory {
    #[must_use]
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            agent_id: None,
            content: content.into(),
            embedding,
            metadata: Metadata::new(),
            retention_strength: 1.0,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_retention_strength(mut self, strength: f64) -> Self {
        self.retention_strength = strength;
        self
    }

    /// Checks shared by every backend before anything is written.
    pub fn validate(&self, dimensions: usize) -> MemoryResult<()> {
        validate_scope_ids(&self.user_id, self.agent_id.as_deref())?;
        if self.content.trim().is_empty() {
            return Err(MemoryError::invalid("content must not be empty"));
        }
        validate_embedding(&self.embedding, dimensions)?;
        validate_strength(self.retention_strength)
    }

    /// Materialize the record as the store persists it.
    pub(crate) fn into_memory(self, id: i64, now: DateTime<Utc>) -> Memory {
        Memory {
            id,
            user_id: self.user_id,
            agent_id: self.agent_id,
            content: self.content,
            embedding: self.embedding,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
            retention_strength: self.retention_strength,
            last_accessed_at: None,
            score: None,
        }
    }
}

/// The (user, agent) partition a memory lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub user_id: String,
    pub agent_id: Option<String>,
}

impl Scope {
    pub fn new(user_id: impl Into<String>, agent_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent_id,
        }
    }

    pub fn lock_key(&self) -> String {
        match &self.agent_id {
            Some(agent) => format!("{}\u{1f}{agent}", self.user_id),
            None => self.user_id.clone(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.agent_id {
            Some(agent) => write!(f, "user={} agent={agent}", self.user_id),
            None => write!(f, "user={}", self.user_id),
        }
    }
}

/// A stored record before and after one atomic access step.
#[derive(Debug, Clone, PartialEq)]
pub struct Reinforcement {
    pub previous: Memory,
    pub memory: Memory,
}

/// Query-time filter for search, listing and bulk deletion.
///
/// `filters` compares top-level metadata keys for equality; only scalar JSON
/// values are accepted. A `null` filter matches records where the key is
/// missing or null. Numbers match on exact `f64` equality.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    /// With no `agent_id`, keep only records no agent wrote.
    pub exact_scope: bool,
    pub filters: BTreeMap<String, Value>,
    pub limit: usize,
    pub offset: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            agent_id: None,
            exact_scope: false,
            filters: BTreeMap::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            cancel: None,
        }
    }
}

impl ScopeFilter {
    /// Matches every record in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// The user's records, narrowed to one agent when the scope names one.
    /// A user-level scope still matches every agent of that user.
    pub fn for_scope(scope: &Scope) -> Self {
        Self {
            user_id: Some(scope.user_id.clone()),
            agent_id: scope.agent_id.clone(),
            ..Self::default()
        }
    }

    /// Records of exactly `scope`: a user-level scope excludes agent records.
    pub fn exact(scope: &Scope) -> Self {
        Self {
            exact_scope: true,
            ..Self::for_scope(scope)
        }
    }

    /// Whether stores must require `agent_id IS NULL`.
    pub fn requires_no_agent(&self) -> bool {
        self.exact_scope && self.agent_id.is_none()
    }

    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.agent_id.is_none()
            && !self.exact_scope
            && self.filters.is_empty()
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if let Some(user) = &self.user_id {
            validate_scope_ids(user, self.agent_id.as_deref())?;
        } else if let Some(agent) = &self.agent_id {
            validate_identifier("agent_id", agent)?;
        }
        for (key, value) in &self.filters {
            if !is_valid_filter_key(key) {
                return Err(MemoryError::invalid(format!(
                    "malformed filter key '{key}': expected [A-Za-z0-9_-], at most {MAX_FILTER_KEY_LEN} chars"
                )));
            }
            if value.is_array() || value.is_object() {
                return Err(MemoryError::invalid(format!(
                    "malformed filter for '{key}': only scalar values are supported"
                )));
            }
        }
        Ok(())
    }

    /// In-process evaluation, identical to what backends push down.
    pub fn matches(&self, memory: &Memory) -> bool {
        if self
            .user_id
            .as_deref()
            .is_some_and(|user| memory.user_id != user)
        {
            return false;
        }
        if self
            .agent_id
            .as_deref()
            .is_some_and(|agent| memory.agent_id.as_deref() != Some(agent))
        {
            return false;
        }
        if self.requires_no_agent() && memory.agent_id.is_some() {
            return false;
        }
        self.matches_metadata(&memory.metadata)
    }

    pub fn matches_metadata(&self, metadata: &Metadata) -> bool {
        self.filters
            .iter()
            .all(|(key, expected)| metadata_value_matches(metadata.get(key), expected))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn ensure_not_cancelled(&self, operation: &str) -> MemoryResult<()> {
        if self.is_cancelled() {
            return Err(MemoryError::Cancelled(format!(
                "{operation} cancelled by caller"
            )));
        }
        Ok(())
    }

    /// Short human-readable form used in error context and logs.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(user) = &self.user_id {
            parts.push(format!("user={user}"));
        }
        if let Some(agent) = &self.agent_id {
            parts.push(format!("agent={agent}"));
        } else if self.exact_scope {
            parts.push("agent=none".to_string());
        }
        for (key, value) in &self.filters {
            parts.push(format!("{key}={value}"));
        }
        if parts.is_empty() {
            "all".to_string()
        } else {
            parts.join(" ")
        }
    }
}

fn metadata_value_matches(stored: Option<&Value>, expected: &Value) -> bool {
    match (stored, expected) {
        (None | Some(Value::Null), Value::Null) => true,
        // Same rule SQLite applies to `json_extract(...) = ?`.
        #[allow(clippy::float_cmp)]
        (Some(Value::Number(a)), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Some(Value::String(a)), Value::String(b)) => a == b,
        (Some(Value::Bool(a)), Value::Bool(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn is_valid_filter_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_FILTER_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_identifier(field: &str, value: &str) -> MemoryResult<()> {
    if value.trim().is_empty() {
        return Err(MemoryError::invalid(format!("{field} must not be empty")));
    }
    if value.chars().any(char::is_control) {
        return Err(MemoryError::invalid(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_scope_ids(user_id: &str, agent_id: Option<&str>) -> MemoryResult<()> {
    validate_identifier("user_id", user_id)?;
    if let Some(agent) = agent_id {
        validate_identifier("agent_id", agent)?;
    }
    Ok(())
}

pub fn validate_embedding(embedding: &[f32], dimensions: usize) -> MemoryResult<()> {
    if embedding.len() != dimensions {
        return Err(MemoryError::invalid(format!(
            "embedding dimension mismatch: got {}, expected {dimensions}",
            embedding.len()
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(MemoryError::invalid("embedding contains non-finite values"));
    }
    Ok(())
}

pub fn validate_strength(strength: f64) -> MemoryResult<()> {
    if strength.is_finite() && strength > 0.0 && strength <= 1.0 {
        Ok(())
    } else {
        Err(MemoryError::invalid(format!(
            "retention strength must be within (0, 1], got {strength}"
        )))
    }
}

/// Store clock, truncated to the precision timestamps are persisted with.
pub fn store_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 form; sorts lexicographically in time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> MemoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| MemoryError::Serialization(format!("invalid timestamp '{raw}': {e}")))
}

pub fn encode_metadata(metadata: &Metadata) -> MemoryResult<String> {
    Ok(serde_json::to_string(metadata)?)
}

pub fn decode_metadata(raw: &str) -> MemoryResult<Metadata> {
    if raw.trim().is_empty() {
        return Ok(Metadata::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        other => Err(MemoryError::Serialization(format!(
            "metadata must be a JSON object, found {other}"
        ))),
    }
}

/// What happens to a duplicate candidate's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Leave the existing record's content alone; reinforce only.
    #[default]
    KeepExisting,
    /// Candidate content and embedding supersede the existing record.
    Replace,
    /// Candidate content is appended on a new line; embedding unchanged.
    Append,
}

/// Which reads count as access events that reinforce retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinforcePolicy {
    /// Only `mark_used` reinforces; reads are side-effect free.
    #[default]
    ExplicitOnly,
    /// Every `get` and every returned search hit reinforces.
    EveryRead,
}

/// Retention handling when a memory's content is edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRetentionPolicy {
    /// Keep accumulated strength and access history.
    #[default]
    Preserve,
    /// Start over at full strength as if freshly accessed.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAlgorithm {
    /// Let the backend pick.
    #[default]
    Auto,
    IvfPq,
    IvfHnswSq,
    IvfHnswPq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

/// Nearest-neighbor index request; unset tuning knobs use backend defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub algorithm: IndexAlgorithm,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub num_partitions: Option<u32>,
    #[serde(default)]
    pub num_sub_vectors: Option<u32>,
    #[serde(default)]
    pub num_edges: Option<u32>,
    #[serde(default)]
    pub ef_construction: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub backend: &'static str,
    /// Nearest-neighbor search runs inside the storage engine.
    pub native_index: bool,
    /// Search results are exact rather than approximate.
    pub exact_search: bool,
}
