use serde::{Deserialize, Serialize};

/// A source that could not be ingested and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub reason: String,
}

/// Statistics about an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Sources offered to the run
    pub discovered: usize,

    /// Sources skipped as already ingested (or repeated within the run)
    pub skipped: usize,

    /// Sources chunked and embedded successfully
    pub processed: usize,

    /// Passages appended to the store
    pub chunks_added: usize,

    /// Records in the store after the run
    pub total_records: usize,

    /// Whether a new generation was committed
    pub persisted: bool,

    /// Whether the run started from an emptied store
    pub rebuilt: bool,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Sources that failed and were skipped
    pub failures: Vec<SourceFailure>,
}

impl IndexStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processed(&mut self, chunks: usize) {
        self.processed += 1;
        self.chunks_added += chunks;
    }

    pub fn add_failure(&mut self, source_id: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(SourceFailure {
            source_id: source_id.into(),
            reason: reason.into(),
        });
    }
}
