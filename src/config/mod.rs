pub mod schema;

pub use schema::{Config, DedupConfig, EmbeddingConfig, RetentionConfig, StoreConfig};
