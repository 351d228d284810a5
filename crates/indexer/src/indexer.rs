use crate::dedup::{DedupKey, ProcessedSources};
use crate::error::Result;
use crate::index_lock::acquire_index_write_lock;
use crate::source::DocumentSource;
use crate::stats::IndexStats;
use knowledge_text_chunker::{Chunker, ChunkerConfig};
use knowledge_vector_store::{embed_checked, sha256_hex, Embedder, KnowledgeStore, PassageRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Tunables of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerOptions {
    pub chunker: ChunkerConfig,
    pub dedup: DedupKey,
}

/// Passages and vectors produced from one source, merged only if every step succeeded
struct SourceBatch {
    content_hash: String,
    vectors: Vec<Vec<f32>>,
    records: Vec<PassageRecord>,
}

enum SourceOutcome {
    AlreadyIndexed,
    Indexed(SourceBatch),
}

/// Dedup-aware ingestion into a [`KnowledgeStore`] directory.
///
/// Each run loads the committed state, chunks and embeds only sources that are not yet
/// indexed, appends every successful source in one step, and commits a new generation.
/// A failing source is logged and skipped; the rest of the run continues.
pub struct IncrementalIndexer {
    store_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    dedup: DedupKey,
}

impl IncrementalIndexer {
    /// Fails with `InvalidConfig` when the chunking parameters are unusable
    pub fn new(
        store_dir: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
        options: IndexerOptions,
    ) -> Result<Self> {
        let chunker = Chunker::new(options.chunker)?;
        Ok(Self {
            store_dir: store_dir.as_ref().to_path_buf(),
            embedder,
            chunker,
            dedup: options.dedup,
        })
    }

    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    #[must_use]
    pub const fn dedup(&self) -> DedupKey {
        self.dedup
    }

    /// Ingest the sources not yet present in the store
    pub async fn run<S: DocumentSource>(&self, sources: &[S]) -> Result<IndexStats> {
        self.run_with_mode(sources, false).await
    }

    /// Discard the persisted state and ingest `sources` from scratch.
    ///
    /// The old state remains the committed one until the rebuilt generation is written, so an
    /// interrupted rebuild loses nothing.
    pub async fn rebuild<S: DocumentSource>(&self, sources: &[S]) -> Result<IndexStats> {
        self.run_with_mode(sources, true).await
    }

    async fn run_with_mode<S: DocumentSource>(
        &self,
        sources: &[S],
        rebuild: bool,
    ) -> Result<IndexStats> {
        let start = Instant::now();
        let mut stats = IndexStats::new();
        stats.discovered = sources.len();
        stats.rebuilt = rebuild;

        // Single writer per store directory, across processes.
        let _write_lock = acquire_index_write_lock(&self.store_dir).await?;

        let mut store = if rebuild {
            log::info!("Rebuilding knowledge store at {}", self.store_dir.display());
            KnowledgeStore::empty_successor(&self.store_dir).await
        } else {
            KnowledgeStore::load(&self.store_dir).await?
        };
        if let Some(model) = store.embedding_model() {
            if model != self.embedder.model_id() {
                log::warn!(
                    "Store was built with embedding model {model}, ingesting with {}",
                    self.embedder.model_id()
                );
            }
        }

        let mut processed = ProcessedSources::from_metadata(store.metadata());
        log::info!(
            "Store holds {} records from {} sources; {} candidate sources",
            store.len(),
            processed.len(),
            sources.len()
        );

        let mut dimension = store.dimension();
        let mut new_vectors: Vec<Vec<f32>> = Vec::new();
        let mut new_records: Vec<PassageRecord> = Vec::new();
        let mut seen_this_run: HashSet<&str> = HashSet::new();

        for source in sources {
            let source_id = source.source_id();
            if !seen_this_run.insert(source_id) {
                log::debug!("Ignoring repeated source {source_id}");
                stats.skipped += 1;
                continue;
            }
            if processed.known_id(self.dedup, source_id) {
                log::debug!("Skipping already indexed source {source_id}");
                stats.skipped += 1;
                continue;
            }

            log::info!("Processing {source_id}");
            match self.process_source(source, &processed, dimension).await {
                Ok(SourceOutcome::AlreadyIndexed) => {
                    log::debug!("Skipping unchanged source {source_id}");
                    stats.skipped += 1;
                }
                Ok(SourceOutcome::Indexed(batch)) => {
                    if let Some(first) = batch.vectors.first() {
                        dimension.get_or_insert(first.len());
                    }
                    processed.record(source_id, &batch.content_hash);
                    stats.add_processed(batch.records.len());
                    new_vectors.extend(batch.vectors);
                    new_records.extend(batch.records);
                }
                Err(err) => {
                    log::warn!("Failed to process {source_id}: {err}; skipping");
                    stats.add_failure(source_id, err.to_string());
                }
            }
        }

        if new_records.is_empty() && !rebuild {
            log::info!("No new documents to process");
            stats.total_records = store.len();
            stats.time_ms = elapsed_ms(start);
            return Ok(stats);
        }

        store.append(&new_vectors, new_records)?;
        if store.embedding_model().is_none() || rebuild {
            store.set_embedding_model(self.embedder.model_id());
        }
        store.persist().await?;

        stats.persisted = true;
        stats.total_records = store.len();
        stats.time_ms = elapsed_ms(start);
        log::info!(
            "Added {} passages from {} sources ({} skipped, {} failed); store holds {} records",
            stats.chunks_added,
            stats.processed,
            stats.skipped,
            stats.failures.len(),
            stats.total_records
        );
        Ok(stats)
    }

    async fn process_source<S: DocumentSource>(
        &self,
        source: &S,
        processed: &ProcessedSources,
        dimension: Option<usize>,
    ) -> Result<SourceOutcome> {
        let source_id = source.source_id();
        let text = source.extract().await?;
        let hash = sha256_hex(text.as_bytes());
        if self.dedup.needs_content() && processed.known_content(self.dedup, source_id, &hash) {
            return Ok(SourceOutcome::AlreadyIndexed);
        }

        let passages = self.chunker.chunk_source(source_id, &text);
        if passages.is_empty() {
            log::warn!("{source_id} produced no passages");
        }
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = embed_checked(self.embedder.as_ref(), &texts, dimension).await?;
        let records = passages
            .into_iter()
            .map(|passage| PassageRecord::new(passage, Some(hash.clone())))
            .collect();

        Ok(SourceOutcome::Indexed(SourceBatch {
            content_hash: hash,
            vectors,
            records,
        }))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
