use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] knowledge_text_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] knowledge_vector_store::VectorStoreError),

    #[error("Extraction failed for {source_id}: {reason}")]
    Extraction { source_id: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    pub fn extraction(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}
