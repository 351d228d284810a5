use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STUB_DIMENSION: usize = 384;
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Maps passages to fixed-dimension dense vectors.
///
/// Implementations must return exactly one vector per input, in input order, and be
/// deterministic for a fixed model version.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model version producing the vectors
    fn model_id(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }
}

/// Embed `texts` and verify the batch: one vector per text, all of one dimension, and that
/// dimension equal to `expected` when the index already has one.
pub async fn embed_checked(
    embedder: &dyn Embedder,
    texts: &[String],
    expected: Option<usize>,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed_batch(texts).await?;
    if vectors.len() != texts.len() {
        return Err(VectorStoreError::EmbeddingError(format!(
            "{} returned {} embeddings for {} inputs",
            embedder.model_id(),
            vectors.len(),
            texts.len()
        )));
    }
    check_batch_dimensions(&vectors, expected)?;
    Ok(vectors)
}

/// Dimension shared by every vector of the batch, checked against `expected` when set.
pub fn check_batch_dimensions(vectors: &[Vec<f32>], expected: Option<usize>) -> Result<Option<usize>> {
    let Some(first) = vectors.first() else {
        return Ok(expected);
    };
    let dimension = expected.unwrap_or(first.len());
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(VectorStoreError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(Some(dimension))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Deterministic hash embedder (offline, tests)
    #[default]
    Stub,
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAi,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "openai" => Ok(Self::OpenAi),
            other => Err(VectorStoreError::InvalidConfig(format!(
                "Unsupported embedding mode '{other}' (expected 'stub' or 'openai')"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stub => "stub",
            Self::OpenAi => "openai",
        }
    }
}

/// Embedding backend settings; defaults, then `knowledge.toml`, then environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Stub,
            model: None,
            dimensions: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `KNOWLEDGE_*` / `OPENAI_API_KEY` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = env::var("KNOWLEDGE_EMBEDDING_MODE") {
            self.mode = EmbeddingMode::parse(&raw)?;
        }
        if let Ok(model) = env::var("KNOWLEDGE_EMBEDDING_MODEL") {
            self.model = Some(model);
        }
        if let Ok(raw) = env::var("KNOWLEDGE_EMBEDDING_DIMENSIONS") {
            let dimensions = raw.trim().parse::<usize>().map_err(|err| {
                VectorStoreError::InvalidConfig(format!(
                    "KNOWLEDGE_EMBEDDING_DIMENSIONS='{raw}' is not a number: {err}"
                ))
            })?;
            self.dimensions = Some(dimensions);
        }
        if let Ok(url) = env::var("KNOWLEDGE_OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        Ok(())
    }

    /// Build the configured backend
    pub fn build(&self) -> Result<Arc<dyn Embedder>> {
        match self.mode {
            EmbeddingMode::Stub => {
                let dimension = self.dimensions.unwrap_or(DEFAULT_STUB_DIMENSION);
                Ok(Arc::new(StubEmbedder::new(dimension)?))
            }
            EmbeddingMode::OpenAi => {
                let api_key = self.api_key.clone().ok_or_else(|| {
                    VectorStoreError::InvalidConfig(
                        "OPENAI_API_KEY is required for the openai embedding mode".into(),
                    )
                })?;
                let model = self
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                Ok(Arc::new(OpenAiEmbedder::new(
                    &api_key,
                    &self.base_url,
                    model,
                    self.dimensions,
                    Duration::from_secs(self.timeout_secs),
                    self.max_retries,
                    self.batch_size,
                )?))
            }
        }
    }
}

/// Deterministic pseudo-embeddings derived from a hash of the text.
///
/// Equal texts map to equal unit vectors; there is no semantic signal, which is enough for
/// offline runs and tests of the storage pipeline.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dimension: usize,
    model_id: String,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::InvalidConfig(
                "stub embedding dimension must be > 0".into(),
            ));
        }
        Ok(Self {
            dimension,
            model_id: format!("stub-{dimension}"),
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect())
    }
}

/// Client for OpenAI-compatible embedding endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(VectorStoreError::InvalidConfig("missing OpenAI API key".into()));
        }
        if model.trim().is_empty() {
            return Err(VectorStoreError::InvalidConfig("missing embedding model name".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| VectorStoreError::InvalidConfig("invalid OpenAI API key".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| VectorStoreError::EmbeddingError(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
            max_retries: max_retries.max(1),
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let mut attempt = 0usize;
        loop {
            let failure = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                        VectorStoreError::EmbeddingError(format!(
                            "failed to parse embedding response: {e}"
                        ))
                    })?;
                    parsed.data.sort_by_key(|entry| entry.index);
                    return Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    let retryable = should_retry(status);
                    (format!("embeddings request failed ({status}): {body}"), retryable)
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    (format!("embeddings request failed: {err}"), retryable)
                }
            };

            let (message, retryable) = failure;
            attempt += 1;
            if !retryable || attempt >= self.max_retries {
                return Err(VectorStoreError::EmbeddingError(message));
            }
            log::warn!("{message}; retrying (attempt {attempt}/{})", self.max_retries);
            tokio::time::sleep(retry_backoff(attempt)).await;
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_request(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
