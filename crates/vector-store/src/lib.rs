//! # Knowledge Vector Store
//!
//! Persistent, append-only similarity index over document passages.
//!
//! ## Features
//!
//! - **Exact search**: brute-force squared Euclidean nearest neighbors
//! - **Parallel metadata**: passage records aligned with index ids
//! - **Crash-safe persistence**: generation files committed by an atomic manifest swap
//! - **Pluggable embeddings**: deterministic stub or OpenAI-compatible HTTP backend
//!
//! ## Architecture
//!
//! ```text
//! Passage[]
//!     │
//!     ├──> Embedder
//!     │      └─> Vector[D]
//!     │
//!     ├──> VectorIndex (ids 0..N, append-only)
//!     │      └─> Exact k-NN search
//!     │
//!     ├──> MetadataStore (records 0..N)
//!     │
//!     └──> KnowledgeStore::persist
//!            ├─> index-<gen>.bin + metadata-<gen>.json
//!            └─> manifest.json (atomic commit)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use knowledge_vector_store::{Embedder, KnowledgeStore, StubEmbedder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = KnowledgeStore::load("data/knowledge").await?;
//!     let embedder = StubEmbedder::new(384)?;
//!
//!     let query = embedder.embed("how do I request vacation?").await?;
//!     for hit in store.search(&query, 3)? {
//!         println!("{} ({:.4}): {}", hit.record.source(), hit.distance, hit.record.text());
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod flat_index;
mod metadata;
mod paths;
mod store;

pub use embeddings::{
    check_batch_dimensions, embed_checked, Embedder, EmbeddingConfig, EmbeddingMode,
    OpenAiEmbedder, StubEmbedder, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
    DEFAULT_STUB_DIMENSION,
};
pub use error::{Result, VectorStoreError};
pub use flat_index::VectorIndex;
pub use metadata::{MetadataStore, PassageRecord, METADATA_SCHEMA_VERSION};
pub use paths::{
    config_path_for_store, lock_path, manifest_path, CONFIG_FILE_NAME, DEFAULT_STORE_DIR,
    LOCK_FILE_NAME, MANIFEST_FILE_NAME,
};
pub use store::{
    read_manifest, sha256_hex, KnowledgeStore, SearchHit, StoreManifest, STORE_SCHEMA_VERSION,
};

// Re-export chunker types for convenience
pub use knowledge_text_chunker::Passage;
