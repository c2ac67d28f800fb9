use crate::config::EmbeddingConfig;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Turns text into vectors for the store.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Offline bag-of-words embedder.
///
/// Each lowercase word draws a fixed pseudo-random direction from its hash;
/// a text is the normalized sum of its words. Same words, same vector, so
/// texts that share vocabulary land close together. Good enough for local
/// use and tests, nothing more.
pub struct HashEmbedding {
    dims: usize,
    seed: u64,
}

impl HashEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims, seed: 0 }
    }

    pub fn with_seed(dims: usize, seed: u64) -> Self {
        Self { dims, seed }
    }

    fn word_hash(&self, word: &str) -> u64 {
        word.bytes()
            .fold(0xcbf2_9ce4_8422_2325 ^ self.seed, |hash, b| {
                (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            })
    }

    #[allow(clippy::cast_precision_loss)]
    fn add_word(&self, word: &str, into: &mut [f32]) {
        // xorshift64* seeded by the word; never zero.
        let mut state = self.word_hash(word) | 1;
        for slot in into.iter_mut() {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let draw = state.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 40;
            *slot += (draw as f32 / ((1u32 << 24) - 1) as f32) * 2.0 - 1.0;
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut v = vec![0.0_f32; self.dims];
        if words.is_empty() {
            self.add_word(text.trim(), &mut v);
        }
        for word in &words {
            self.add_word(word, &mut v);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for `POST {base}/v1/embeddings` on OpenAI or a compatible server.
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedding {
    pub fn new(base_url: &str, api_key: &str, model: &str, dims: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: EmbeddingResponse = response.json().await?;
        let Some(first) = body.data.into_iter().next() else {
            anyhow::bail!("embedding response carried no vectors");
        };
        anyhow::ensure!(
            first.embedding.len() == self.dims,
            "embedding has {} dimensions, store expects {}",
            first.embedding.len(),
            self.dims
        );
        Ok(first.embedding)
    }
}

/// Base URL of a `custom:` provider: http(s) with a host and nothing after
/// the path.
fn custom_base_url(raw: &str) -> anyhow::Result<String> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("invalid embedding base URL '{raw}': {e}"))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https") && url.has_host(),
        "embedding base URL '{raw}' must be http(s) with a host"
    );
    anyhow::ensure!(
        url.query().is_none() && url.fragment().is_none(),
        "embedding base URL '{raw}' must not carry a query or fragment"
    );
    Ok(url.as_str().trim_end_matches('/').to_string())
}

pub fn create_embedding_provider(
    config: &EmbeddingConfig,
    dims: usize,
) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    let key = config.api_key.as_deref().unwrap_or_default();
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbedding::new(dims))),
        "openai" => {
            anyhow::ensure!(!key.is_empty(), "embedding provider 'openai' needs an api_key");
            Ok(Box::new(OpenAiEmbedding::new(
                OPENAI_BASE_URL,
                key,
                &config.model,
                dims,
            )?))
        }
        other => match other.strip_prefix("custom:") {
            Some(base) => Ok(Box::new(OpenAiEmbedding::new(
                &custom_base_url(base)?,
                key,
                &config.model,
                dims,
            )?)),
            None => anyhow::bail!("unknown embedding provider '{other}'"),
        },
    }
}
