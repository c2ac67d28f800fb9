use super::super::{DedupConfig, EmbeddingConfig, RetentionConfig, StoreConfig};
use crate::error::{ConfigError, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let memoria_dir = home.join(".memoria");

        Self {
            workspace_dir: memoria_dir.join("workspace"),
            config_path: memoria_dir.join("config.toml"),
            store: StoreConfig::default(),
            dedup: DedupConfig::default(),
            retention: RetentionConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Resolved storage directory for the configured backend.
    pub fn data_dir(&self) -> PathBuf {
        match self.store.data_dir.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
            }
            _ => self.workspace_dir.join("memory"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |section: &str, err: anyhow::Error| {
            ConfigError::Validation(format!("invalid [{section}] section: {err:#}"))
        };
        self.store.validate().map_err(|e| invalid("store", e))?;
        self.dedup.validate().map_err(|e| invalid("dedup", e))?;
        self.retention
            .validate()
            .map_err(|e| invalid("retention", e))?;
        Ok(())
    }
}
