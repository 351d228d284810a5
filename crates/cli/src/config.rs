use anyhow::{Context as AnyhowContext, Result};
use knowledge_indexer::{DedupKey, IndexerOptions};
use knowledge_text_chunker::ChunkerConfig;
use knowledge_vector_store::{config_path_for_store, EmbeddingConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TOP_K: usize = 3;

/// Optional `knowledge.toml` next to the store directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkerConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: DEFAULT_TOP_K }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub dedup: DedupKey,
}

impl FileConfig {
    /// Read the config belonging to `store_dir`; a missing file yields the defaults
    pub fn load_for_store(store_dir: &Path) -> Result<Self> {
        let path = config_path_for_store(store_dir);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        log::debug!("Loaded configuration from {}", path.display());
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Embedding settings with environment overrides applied
    pub fn embedding_with_env(&self) -> Result<EmbeddingConfig> {
        let mut embedding = self.embedding.clone();
        embedding.apply_env()?;
        Ok(embedding)
    }

    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            chunker: self.chunking.clone(),
            dedup: self.ingest.dedup,
        }
    }
}
