use crate::error::{Result, VectorStoreError};
use knowledge_text_chunker::Passage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Metadata for one index entry: the passage plus the fingerprint of the source text it came
/// from (used by content-hash deduplication).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassageRecord {
    #[serde(flatten)]
    pub passage: Passage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
}

impl PassageRecord {
    #[must_use]
    pub const fn new(passage: Passage, source_hash: Option<String>) -> Self {
        Self {
            passage,
            source_hash,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.passage.source
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.passage.text
    }
}

/// Ordered passage records sharing the positional id space of the [`VectorIndex`].
///
/// Only ever appended to; it is persisted and loaded together with the index by
/// [`KnowledgeStore`], never on its own.
///
/// [`VectorIndex`]: crate::VectorIndex
/// [`KnowledgeStore`]: crate::KnowledgeStore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    records: Vec<PassageRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedMetadata {
    schema_version: u32,
    records: Vec<PassageRecord>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, records: impl IntoIterator<Item = PassageRecord>) {
        self.records.extend(records);
    }

    #[must_use]
    pub fn all(&self) -> &[PassageRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&PassageRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identifiers of every source that contributed at least one record
    #[must_use]
    pub fn sources(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .map(|record| record.passage.source.clone())
            .collect()
    }

    /// Fingerprints of every indexed source text
    #[must_use]
    pub fn source_hashes(&self) -> HashSet<String> {
        self.records
            .iter()
            .filter_map(|record| record.source_hash.clone())
            .collect()
    }

    /// `(source, fingerprint)` pairs of every indexed source text
    #[must_use]
    pub fn source_versions(&self) -> HashSet<(String, String)> {
        self.records
            .iter()
            .filter_map(|record| {
                record
                    .source_hash
                    .as_ref()
                    .map(|hash| (record.passage.source.clone(), hash.clone()))
            })
            .collect()
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        let persisted = PersistedMetadata {
            schema_version: METADATA_SCHEMA_VERSION,
            records: self.records.clone(),
        };
        Ok(serde_json::to_vec(&persisted)?)
    }

    pub(crate) fn from_json(bytes: &[u8]) -> Result<Self> {
        let persisted: PersistedMetadata = serde_json::from_slice(bytes)
            .map_err(|err| VectorStoreError::corrupt(format!("metadata is unreadable: {err}")))?;
        if persisted.schema_version != METADATA_SCHEMA_VERSION {
            return Err(VectorStoreError::corrupt(format!(
                "Unsupported metadata schema_version {} (expected {METADATA_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }
        Ok(Self {
            records: persisted.records,
        })
    }
}
