use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index is empty")]
    EmptyIndex,

    #[error("Misaligned batch: {vectors} vectors for {records} records")]
    MisalignedBatch { vectors: usize, records: usize },

    #[error("Corrupt persisted state: {0}")]
    CorruptPersistedState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl VectorStoreError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptPersistedState(msg.into())
    }
}
