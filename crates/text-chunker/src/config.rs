use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Default passage size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive passages in characters
pub const DEFAULT_OVERLAP: usize = 50;

/// Configuration for passage splitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Target passage size in characters (hard limit unless a single
    /// separator-free run is longer and no finer separator is configured)
    pub chunk_size: usize,

    /// Characters shared by consecutive passages
    pub overlap: usize,

    /// Separators in priority order, coarsest first. An empty string means
    /// "split between any two characters".
    pub separators: Vec<String>,

    /// Trim leading/trailing whitespace of every emitted passage
    pub strip_whitespace: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            separators: default_separators(),
            strip_whitespace: true,
        }
    }
}

impl ChunkerConfig {
    /// Config with explicit size and overlap, default separators
    #[must_use]
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.overlap >= self.chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }
}

/// Paragraph, line, sentence, word, character.
#[must_use]
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ".", " ", ""]
        .into_iter()
        .map(str::to_string)
        .collect()
}
