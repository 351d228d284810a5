//! # Knowledge Indexer
//!
//! Incremental ingestion of documents into a knowledge store directory.
//!
//! ## Pipeline
//!
//! ```text
//! Sources (folder scan or in-memory text)
//!     │
//!     ├──> Dedup filter (identifier / content hash / both)
//!     │      └─> Sources not yet ingested
//!     │
//!     ├──> Extract + Chunker
//!     │      └─> Passages
//!     │
//!     ├──> Embedder (one batch per source)
//!     │      └─> Vectors
//!     │
//!     └──> Knowledge store (append + commit generation)
//!            └─> Searchable index
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use knowledge_indexer::{DirectorySource, IncrementalIndexer, IndexerOptions};
//! use knowledge_vector_store::StubEmbedder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = Arc::new(StubEmbedder::new(384)?);
//!     let indexer = IncrementalIndexer::new("data/knowledge", embedder, IndexerOptions::default())?;
//!     let documents = DirectorySource::new("data/uploads").scan()?;
//!     let stats = indexer.run(&documents).await?;
//!
//!     println!("Indexed {} sources, {} passages", stats.processed, stats.chunks_added);
//!     Ok(())
//! }
//! ```

mod dedup;
mod error;
mod index_lock;
mod indexer;
mod source;
mod stats;

pub use dedup::DedupKey;
pub use error::{IndexerError, Result};
pub use indexer::{IncrementalIndexer, IndexerOptions};
pub use source::{DirectorySource, DocumentSource, FileDocument, TextDocument};
pub use stats::{IndexStats, SourceFailure};
