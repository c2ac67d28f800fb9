use super::dedup::{DedupManager, DedupOutcome};
use super::memory_types::{
    IndexConfig, Memory, MergePolicy, Metadata, NewMemory, ReinforcePolicy, Scope, ScopeFilter,
    UpdateRetentionPolicy, store_now, validate_scope_ids,
};
use super::retention::RetentionManager;
use super::scope_lock::ScopeLocks;
use super::traits::VectorStore;
use super::vector;
use crate::config::{Config, DedupConfig, RetentionConfig};
use crate::error::{MemoryError, MemoryResult};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Engine-level knobs, resolved from [`Config`] once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineConfig {
    pub dedup: DedupConfig,
    pub retention: RetentionConfig,
    /// Upper bound per engine call; `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dedup: config.dedup,
            retention: config.retention,
            operation_timeout: config.store.operation_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddRequest {
    pub user_id: String,
    pub agent_id: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl AddRequest {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            user_id: user_id.into(),
            agent_id: None,
            content: content.into(),
            embedding,
            metadata: Metadata::new(),
        }
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

    pub fn scope(&self) -> Scope {
        Scope::new(self.user_id.clone(), self.agent_id.clone())
    }

    fn into_new_memory(self) -> NewMemory {
        let mut memory = NewMemory::new(self.user_id, self.content, self.embedding)
            .with_metadata(self.metadata);
        memory.agent_id = self.agent_id;
        memory
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddDisposition {
    Inserted,
    /// Collapsed into an existing record of the same scope.
    Duplicate {
        similarity: f32,
        previous_strength: f64,
        policy: MergePolicy,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub memory: Memory,
    pub disposition: AddDisposition,
}

impl AddOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self.disposition, AddDisposition::Duplicate { .. })
    }
}

/// A stored record plus its decayed strength at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub current_strength: f64,
    /// Ranking key for search results: similarity blended with strength.
    pub relevance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemoryStats {
    pub count: usize,
    pub mean_strength: f64,
    pub min_strength: f64,
    pub max_strength: f64,
}

/// Lifecycle coordinator over a [`VectorStore`]: dedup on write, retention
/// on read, scope locks around read-check-write sequences.
pub struct MemoryEngine {
    store: Arc<dyn VectorStore>,
    dedup: DedupManager,
    retention: RetentionManager,
    config: EngineConfig,
    locks: ScopeLocks,
}

impl MemoryEngine {
    pub fn new(store: Arc<dyn VectorStore>, config: EngineConfig) -> MemoryResult<Self> {
        if !(0.0..=1.0).contains(&config.retention.ranking_weight) {
            return Err(MemoryError::invalid(format!(
                "ranking weight must be within [0, 1], got {}",
                config.retention.ranking_weight
            )));
        }
        let retention = RetentionManager::from_config(&config.retention)?;
        let dedup = DedupManager::new(Arc::clone(&store), config.dedup, retention)?;
        Ok(Self {
            store,
            dedup,
            retention,
            config,
            locks: ScopeLocks::default(),
        })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn bounded<T, F>(&self, operation: &'static str, scope: String, fut: F) -> MemoryResult<T>
    where
        F: Future<Output = MemoryResult<T>>,
    {
        let Some(limit) = self.config.operation_timeout else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, scope = %scope, ?limit, "memory operation timed out");
                Err(MemoryError::Cancelled(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))
                .during(operation, scope))
            }
        }
    }

    fn retrieved(&self, memory: Memory, now: chrono::DateTime<chrono::Utc>) -> RetrievedMemory {
        let current_strength = self.retention.current_strength(&memory, now);
        RetrievedMemory {
            memory,
            current_strength,
            relevance: None,
        }
    }

    /// One access event, computed from the record as stored at write time.
    async fn reinforce(&self, memory: &Memory) -> MemoryResult<Memory> {
        let now = store_now();
        let retention = self.retention;
        let step = move |stored: &Memory| retention.reinforce_at(stored, now);
        let mut updated = self.store.reinforce(memory.id, now, &step).await?.memory;
        updated.score = memory.score;
        Ok(updated)
    }

    /// Store a memory, collapsing it into a near-identical one of the same
    /// scope when dedup is enabled.
    pub async fn add(&self, request: AddRequest) -> MemoryResult<AddOutcome> {
        let scope = request.scope();
        self.bounded("add", scope.to_string(), async {
            let candidate = request.into_new_memory();
            candidate
                .validate(self.store.dimensions())
                .map_err(|e| e.during("add", scope.to_string()))?;

            let _guard = self.locks.acquire(&scope).await;
            let now = store_now();
            if let DedupOutcome::Duplicate(found) = self
                .dedup
                .check(&candidate.content, &candidate.embedding, &scope, now)
                .await?
            {
                return Ok(AddOutcome {
                    memory: found.memory,
                    disposition: AddDisposition::Duplicate {
                        similarity: found.similarity,
                        previous_strength: found.previous_strength,
                        policy: found.policy,
                    },
                });
            }

            let memory = self.store.insert(candidate).await?;
            tracing::debug!(id = memory.id, scope = %scope, "memory added");
            Ok(AddOutcome {
                memory,
                disposition: AddDisposition::Inserted,
            })
        })
        .await
    }

    pub async fn get(&self, id: i64) -> MemoryResult<RetrievedMemory> {
        self.bounded("get", format!("id={id}"), async {
            let memory = self.store.get(id).await?;
            let memory = match self.config.retention.reinforce_on {
                ReinforcePolicy::EveryRead => self.reinforce(&memory).await?,
                ReinforcePolicy::ExplicitOnly => memory,
            };
            Ok(self.retrieved(memory, store_now()))
        })
        .await
    }

    /// Explicit access event: always persists one reinforcement step.
    pub async fn mark_used(&self, id: i64) -> MemoryResult<RetrievedMemory> {
        self.bounded("mark_used", format!("id={id}"), async {
            let memory = self.store.get(id).await?;
            let memory = self.reinforce(&memory).await?;
            Ok(self.retrieved(memory, store_now()))
        })
        .await
    }

    pub async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: &[f32],
    ) -> MemoryResult<RetrievedMemory> {
        self.bounded("update", format!("id={id}"), async {
            let memory = self.store.update(id, content, embedding).await?;
            let memory = match self.config.retention.update_policy {
                UpdateRetentionPolicy::Preserve => memory,
                UpdateRetentionPolicy::Reset => {
                    self.store.record_access(id, 1.0, store_now()).await?
                }
            };
            Ok(self.retrieved(memory, store_now()))
        })
        .await
    }

    pub async fn delete(&self, id: i64) -> MemoryResult<()> {
        self.bounded("delete", format!("id={id}"), self.store.delete(id))
            .await
    }

    pub async fn delete_all(&self, filter: &ScopeFilter) -> MemoryResult<usize> {
        self.bounded("delete_all", filter.describe(), async {
            let removed = self.store.delete_all(filter).await?;
            tracing::info!(removed, scope = %filter.describe(), "memories deleted");
            Ok(removed)
        })
        .await
    }

    /// Forget one scope. With no agent every memory of the user goes,
    /// whatever agent wrote it, and no add for that user interleaves.
    pub async fn reset(&self, user_id: &str, agent_id: Option<&str>) -> MemoryResult<usize> {
        let scope = Scope::new(user_id, agent_id.map(str::to_string));
        self.bounded("reset", scope.to_string(), async {
            validate_scope_ids(user_id, agent_id).map_err(|e| e.during("reset", scope.to_string()))?;
            let _guard = match agent_id {
                Some(_) => self.locks.acquire(&scope).await,
                None => self.locks.acquire_user(user_id).await,
            };
            let filter = ScopeFilter::for_scope(&scope);
            let removed = self.store.delete_all(&filter).await?;
            tracing::info!(removed, scope = %scope, "memory scope reset");
            Ok(removed)
        })
        .await
    }

    /// Similarity search with decayed strength attached. A positive ranking
    /// weight re-orders the store's hits by blended relevance.
    pub async fn search(
        &self,
        query: &[f32],
        filter: &ScopeFilter,
    ) -> MemoryResult<Vec<RetrievedMemory>> {
        self.bounded("search", filter.describe(), async {
            let hits = self.store.search(query, filter).await?;
            let now = store_now();
            let weight = self.config.retention.ranking_weight;

            let mut ranked: Vec<RetrievedMemory> = hits
                .into_iter()
                .map(|memory| {
                    let mut retrieved = self.retrieved(memory, now);
                    let similarity = retrieved.memory.score.unwrap_or(0.0);
                    retrieved.relevance = Some(vector::blended_score(
                        similarity,
                        retrieved.current_strength,
                        weight,
                    ));
                    retrieved
                })
                .collect();
            if weight > 0.0 {
                ranked.sort_by(|a, b| {
                    b.relevance
                        .unwrap_or(0.0)
                        .total_cmp(&a.relevance.unwrap_or(0.0))
                });
            }

            if self.config.retention.reinforce_on == ReinforcePolicy::EveryRead {
                for hit in &mut ranked {
                    filter.ensure_not_cancelled("search")?;
                    hit.memory = self.reinforce(&hit.memory).await?;
                    hit.current_strength = self.retention.current_strength(&hit.memory, now);
                }
            }
            Ok(ranked)
        })
        .await
    }

    pub async fn get_all(&self, filter: &ScopeFilter) -> MemoryResult<Vec<RetrievedMemory>> {
        self.bounded("get_all", filter.describe(), async {
            let rows = self.store.get_all(filter).await?;
            let now = store_now();
            Ok(rows
                .into_iter()
                .map(|memory| self.retrieved(memory, now))
                .collect())
        })
        .await
    }

    pub async fn create_index(&self, config: &IndexConfig) -> MemoryResult<()> {
        self.bounded("create_index", self.store.name().to_string(), self.store.create_index(config))
            .await
    }

    /// Records in `filter` whose current strength fell below `threshold`,
    /// weakest first. Nothing is deleted.
    pub async fn stale_memories(
        &self,
        filter: &ScopeFilter,
        threshold: f64,
    ) -> MemoryResult<Vec<RetrievedMemory>> {
        self.bounded("stale_memories", filter.describe(), async {
            if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
                return Err(MemoryError::invalid(format!(
                    "stale threshold must be within (0, 1], got {threshold}"
                ))
                .during("stale_memories", filter.describe()));
            }

            let now = store_now();
            let mut stale: Vec<RetrievedMemory> = self
                .scan_scope(filter, now)
                .await?
                .into_iter()
                .filter(|m| self.retention.is_stale(&m.memory, threshold, now))
                .collect();
            stale.sort_by(|a, b| {
                a.current_strength
                    .total_cmp(&b.current_strength)
                    .then_with(|| a.memory.id.cmp(&b.memory.id))
            });
            Ok(stale
                .into_iter()
                .skip(filter.offset)
                .take(filter.limit)
                .collect())
        })
        .await
    }

    /// Count and current-strength summary over every record in `filter`.
    pub async fn stats(&self, filter: &ScopeFilter) -> MemoryResult<MemoryStats> {
        self.bounded("stats", filter.describe(), async {
            let rows = self.scan_scope(filter, store_now()).await?;
            if rows.is_empty() {
                return Ok(MemoryStats::default());
            }

            let mut sum = 0.0;
            let mut min = f64::INFINITY;
            let mut max = 0.0_f64;
            for row in &rows {
                sum += row.current_strength;
                min = min.min(row.current_strength);
                max = max.max(row.current_strength);
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = sum / rows.len() as f64;
            Ok(MemoryStats {
                count: rows.len(),
                mean_strength: mean,
                min_strength: min,
                max_strength: max,
            })
        })
        .await
    }

    /// Every record in `filter`, pagination ignored.
    async fn scan_scope(
        &self,
        filter: &ScopeFilter,
        now: chrono::DateTime<chrono::Utc>,
    ) -> MemoryResult<Vec<RetrievedMemory>> {
        let unbounded = filter.clone().with_offset(0).with_limit(usize::MAX);
        let rows = self.store.get_all(&unbounded).await?;
        Ok(rows
            .into_iter()
            .map(|memory| self.retrieved(memory, now))
            .collect())
    }
}
