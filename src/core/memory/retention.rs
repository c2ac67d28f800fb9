use super::memory_types::Memory;
use crate::config::RetentionConfig;
use crate::error::{MemoryError, MemoryResult};
use chrono::{DateTime, Utc};

const SECS_PER_HOUR: f64 = 3_600.0;

/// Exponential forgetting curve with access reinforcement.
///
/// Pure arithmetic: nothing here touches storage or the clock. Callers pass
/// `now` explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionManager {
    decay_rate: f64,
    reinforcement_factor: f64,
}

impl RetentionManager {
    /// `decay_rate` is per hour and must be > 0; `reinforcement_factor`
    /// must lie in (0, 1].
    pub fn new(decay_rate: f64, reinforcement_factor: f64) -> MemoryResult<Self> {
        if !decay_rate.is_finite() || decay_rate <= 0.0 {
            return Err(MemoryError::invalid(format!(
                "decay rate must be > 0, got {decay_rate}"
            )));
        }
        if !reinforcement_factor.is_finite()
            || reinforcement_factor <= 0.0
            || reinforcement_factor > 1.0
        {
            return Err(MemoryError::invalid(format!(
                "reinforcement factor must be within (0, 1], got {reinforcement_factor}"
            )));
        }
        Ok(Self {
            decay_rate,
            reinforcement_factor,
        })
    }

    pub fn from_config(config: &RetentionConfig) -> MemoryResult<Self> {
        Self::new(config.decay_rate, config.reinforcement_factor)
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn reinforcement_factor(&self) -> f64 {
        self.reinforcement_factor
    }

    /// `exp(-r * h)` with `h` the hours since the later of creation and last
    /// access. Future anchors count as zero elapsed time.
    pub fn calculate_retention(
        &self,
        created_at: DateTime<Utc>,
        last_accessed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> f64 {
        let anchor = match last_accessed_at {
            Some(accessed) if accessed > created_at => accessed,
            _ => created_at,
        };
        let hours = hours_between(anchor, now);
        (-self.decay_rate * hours)
            .exp()
            .clamp(f64::MIN_POSITIVE, 1.0)
    }

    /// Recover a fraction of the headroom: `s + f * (1 - s)`.
    pub fn reinforce(&self, strength: f64) -> f64 {
        let current = clamp_strength(strength);
        clamp_strength(current + self.reinforcement_factor * (1.0 - current))
    }

    /// Stored strength scaled by decay since the last reinforcing event.
    pub fn current_strength(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        let decay = self.calculate_retention(memory.created_at, memory.last_accessed_at, now);
        clamp_strength(clamp_strength(memory.retention_strength) * decay)
    }

    /// Reinforce from the decayed strength, as an access at `now` would.
    pub fn reinforce_at(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        self.reinforce(self.current_strength(memory, now))
    }

    pub fn is_stale(&self, memory: &Memory, threshold: f64, now: DateTime<Utc>) -> bool {
        self.current_strength(memory, now) < threshold
    }
}

impl Default for RetentionManager {
    fn default() -> Self {
        let config = RetentionConfig::default();
        Self {
            decay_rate: config.decay_rate,
            reinforcement_factor: config.reinforcement_factor,
        }
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .to_std()
        .map_or(0.0, |elapsed| elapsed.as_secs_f64() / SECS_PER_HOUR)
}

/// Keep strength inside (0, 1]; non-finite or non-positive input maps to the
/// smallest positive value.
pub fn clamp_strength(strength: f64) -> f64 {
    if !strength.is_finite() || strength <= 0.0 {
        f64::MIN_POSITIVE
    } else {
        strength.min(1.0)
    }
}
