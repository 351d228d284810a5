use crate::error::{Result, SearchError};
use knowledge_vector_store::{Embedder, KnowledgeStore, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One passage returned for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub source: String,
    /// Squared Euclidean distance to the query; smaller is more relevant
    pub distance: f32,
}

/// Query-side view of a loaded store.
///
/// The snapshot is immutable, so clones of one retriever can serve queries concurrently.
/// Ingestion commits made after loading are picked up by opening a new retriever.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(store: KnowledgeStore, embedder: Arc<dyn Embedder>) -> Self {
        if let Some(model) = store.embedding_model() {
            if model != embedder.model_id() {
                log::warn!(
                    "Querying a store built with {model} using {}",
                    embedder.model_id()
                );
            }
        }
        Self {
            store: Arc::new(store),
            embedder,
        }
    }

    /// Load the committed state of `store_dir`
    pub async fn open(store_dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = KnowledgeStore::load(store_dir).await?;
        Ok(Self::new(store, embedder))
    }

    #[must_use]
    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// The `k` passages nearest to `query`, most relevant first.
    ///
    /// Returns `min(k, len)` results; an empty store yields no results rather than an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        if self.store.is_empty() {
            log::debug!("Knowledge store is empty; no results for '{query}'");
            return Ok(Vec::new());
        }

        log::debug!("Retrieve: query='{query}', k={k}");
        let query_vector = self.embedder.embed(query).await?;
        let hits = match self.store.search(&query_vector, k) {
            Ok(hits) => hits,
            Err(VectorStoreError::EmptyIndex) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedPassage {
                distance: hit.distance,
                source: hit.record.source().to_string(),
                text: hit.record.text().to_string(),
            })
            .collect())
    }
}

/// Context handed to an answer synthesizer: passage texts separated by blank lines
#[must_use]
pub fn format_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, distance: f32) -> RetrievedPassage {
        RetrievedPassage {
            text: text.to_string(),
            source: "doc.txt".to_string(),
            distance,
        }
    }

    #[test]
    fn context_joins_texts_in_rank_order() {
        let ctx = format_context(&[passage("first", 0.0), passage("second", 1.0)]);
        assert_eq!(ctx, "first\n\nsecond");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn passages_serialize_with_flat_fields() {
        let json = serde_json::to_value(passage("body", 0.5)).unwrap();
        assert_eq!(json["text"], "body");
        assert_eq!(json["source"], "doc.txt");
        assert_eq!(json["distance"], 0.5);
    }
}
