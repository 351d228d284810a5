//! # Knowledge Search
//!
//! Query side of the knowledge store: embed a question, find the nearest passages, and hand
//! them to whatever produces the final answer.
//!
//! ```no_run
//! use knowledge_search::{format_context, Retriever};
//! use knowledge_vector_store::StubEmbedder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = Arc::new(StubEmbedder::new(384)?);
//!     let retriever = Retriever::open("data/knowledge", embedder).await?;
//!     let passages = retriever.retrieve("How do I request vacation?", 3).await?;
//!     println!("{}", format_context(&passages));
//!     Ok(())
//! }
//! ```

mod error;
mod retriever;

pub use error::{Result, SearchError};
pub use retriever::{format_context, RetrievedPassage, Retriever};
