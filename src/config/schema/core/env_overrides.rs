use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("MEMORIA_BACKEND")
            && !backend.is_empty()
        {
            self.store.backend = backend;
        }

        if let Ok(dir) = std::env::var("MEMORIA_DATA_DIR")
            && !dir.is_empty()
        {
            self.store.data_dir = Some(dir);
        }

        if let Ok(collection) = std::env::var("MEMORIA_COLLECTION")
            && !collection.is_empty()
        {
            self.store.collection = collection;
        }

        if let Ok(dims_str) = std::env::var("MEMORIA_DIMENSIONS")
            && let Ok(dims) = dims_str.parse::<usize>()
            && dims > 0
        {
            self.store.dimensions = dims;
        }

        if let Ok(provider) = std::env::var("MEMORIA_EMBEDDING_PROVIDER")
            && !provider.is_empty()
        {
            self.embedding.provider = provider;
        }

        if let Ok(key) =
            std::env::var("MEMORIA_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !key.is_empty()
        {
            self.embedding.api_key = Some(key);
        }
    }
}
