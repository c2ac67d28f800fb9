use super::memory_types::{Memory, MergePolicy, Scope, ScopeFilter};
use super::retention::RetentionManager;
use super::traits::VectorStore;
use crate::config::DedupConfig;
use crate::error::{MemoryError, MemoryResult};

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A stored record the candidate collapsed into.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    /// The record after reinforcement and merge.
    pub memory: Memory,
    pub similarity: f32,
    /// Decayed strength just before this access.
    pub previous_strength: f64,
    pub reinforced_strength: f64,
    pub policy: MergePolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    Novel,
    Duplicate(Box<DuplicateMatch>),
}

impl DedupOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Collapses near-identical memories within one scope.
pub struct DedupManager {
    store: Arc<dyn VectorStore>,
    config: DedupConfig,
    retention: RetentionManager,
}

impl DedupManager {
    pub fn new(
        store: Arc<dyn VectorStore>,
        config: DedupConfig,
        retention: RetentionManager,
    ) -> MemoryResult<Self> {
        if !(-1.0..=1.0).contains(&config.threshold) {
            return Err(MemoryError::invalid(format!(
                "dedup threshold must be within [-1, 1], got {}",
                config.threshold
            )));
        }
        if config.top_k == 0 {
            return Err(MemoryError::invalid("dedup top_k must be > 0"));
        }
        Ok(Self {
            store,
            config,
            retention,
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Best stored match at or above the threshold, without side effects.
    ///
    /// Only records of exactly `scope` qualify: a user-level candidate never
    /// matches an agent's record and vice versa.
    pub async fn find_duplicate(
        &self,
        embedding: &[f32],
        scope: &Scope,
    ) -> MemoryResult<Option<(Memory, f32)>> {
        let filter = ScopeFilter::exact(scope).with_limit(self.config.top_k);
        let hits = self.store.search(embedding, &filter).await?;

        let best = hits
            .into_iter()
            .filter_map(|m| {
                let similarity = m.score?;
                (similarity >= self.config.threshold).then_some((m, similarity))
            })
            .reduce(|best, next| {
                let better = next.1 > best.1
                    || (next.1 == best.1 && next.0.updated_at > best.0.updated_at);
                if better { next } else { best }
            });
        Ok(best)
    }

    /// Run dedup for a candidate. On a match the stored record is reinforced
    /// and merged per the configured policy; otherwise nothing is written.
    pub async fn check(
        &self,
        content: &str,
        embedding: &[f32],
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> MemoryResult<DedupOutcome> {
        if !self.config.enabled {
            return Ok(DedupOutcome::Novel);
        }
        let Some((existing, similarity)) = self.find_duplicate(embedding, scope).await? else {
            return Ok(DedupOutcome::Novel);
        };

        let policy = self.config.merge_policy;

        let merged_id = match policy {
            MergePolicy::KeepExisting => existing.id,
            MergePolicy::Replace => self.store.update(existing.id, content, embedding).await?.id,
            MergePolicy::Append if existing.content.trim() == content.trim() => existing.id,
            MergePolicy::Append => {
                let joined = format!("{}\n{}", existing.content, content);
                self.store
                    .update(existing.id, &joined, &existing.embedding)
                    .await?
                    .id
            }
        };
        let retention = self.retention;
        let step = move |stored: &Memory| retention.reinforce_at(stored, now);
        let access = self.store.reinforce(merged_id, now, &step).await?;
        let previous_strength = self.retention.current_strength(&access.previous, now);
        let reinforced_strength = access.memory.retention_strength;
        let memory = access.memory;

        tracing::info!(
            id = memory.id,
            scope = %scope,
            similarity,
            policy = ?policy,
            strength = reinforced_strength,
            "duplicate memory merged"
        );

        Ok(DedupOutcome::Duplicate(Box::new(DuplicateMatch {
            memory,
            similarity,
            previous_strength,
            reinforced_strength,
            policy,
        })))
    }
}
