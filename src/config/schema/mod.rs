mod core;
mod memory;

pub use core::Config;
pub(crate) use memory::is_valid_collection_name;
pub use memory::{DedupConfig, EmbeddingConfig, RetentionConfig, StoreConfig};
