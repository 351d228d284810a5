use knowledge_vector_store::MetadataStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// What decides that a source was already ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupKey {
    /// Same source id ⇒ skip, even when the content changed (checked before extraction)
    #[default]
    Identifier,
    /// Same text fingerprint ⇒ skip, whatever the id
    ContentHash,
    /// Skip only when id and fingerprint both match; changed content under a known id is
    /// appended as new records
    Both,
}

impl DedupKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::ContentHash => "content-hash",
            Self::Both => "both",
        }
    }

    /// Whether the decision needs the extracted text
    #[must_use]
    pub const fn needs_content(self) -> bool {
        !matches!(self, Self::Identifier)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "identifier" | "id" => Ok(Self::Identifier),
            "content-hash" | "content_hash" | "hash" => Ok(Self::ContentHash),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown dedup key '{other}' (expected identifier, content-hash or both)"
            )),
        }
    }
}

/// Sources already present in the store, derived from its metadata
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessedSources {
    ids: BTreeSet<String>,
    hashes: HashSet<String>,
    versions: HashSet<(String, String)>,
}

impl ProcessedSources {
    pub(crate) fn from_metadata(metadata: &MetadataStore) -> Self {
        Self {
            ids: metadata.sources(),
            hashes: metadata.source_hashes(),
            versions: metadata.source_versions(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    /// Decision possible from the id alone
    pub(crate) fn known_id(&self, key: DedupKey, source_id: &str) -> bool {
        key == DedupKey::Identifier && self.ids.contains(source_id)
    }

    /// Decision for hash-based keys once the text fingerprint is known
    pub(crate) fn known_content(&self, key: DedupKey, source_id: &str, hash: &str) -> bool {
        match key {
            DedupKey::Identifier => self.ids.contains(source_id),
            DedupKey::ContentHash => self.hashes.contains(hash),
            DedupKey::Both => self
                .versions
                .contains(&(source_id.to_string(), hash.to_string())),
        }
    }

    pub(crate) fn record(&mut self, source_id: &str, hash: &str) {
        self.ids.insert(source_id.to_string());
        self.hashes.insert(hash.to_string());
        self.versions
            .insert((source_id.to_string(), hash.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys() {
        assert_eq!("identifier".parse::<DedupKey>().unwrap(), DedupKey::Identifier);
        assert_eq!("content-hash".parse::<DedupKey>().unwrap(), DedupKey::ContentHash);
        assert_eq!("BOTH".parse::<DedupKey>().unwrap(), DedupKey::Both);
        assert!("filename".parse::<DedupKey>().is_err());
        assert_eq!(DedupKey::ContentHash.to_string(), "content-hash");
    }

    #[test]
    fn decisions_per_key() {
        let mut processed = ProcessedSources::default();
        processed.record("doc1.txt", "h1");

        assert!(processed.known_id(DedupKey::Identifier, "doc1.txt"));
        assert!(!processed.known_id(DedupKey::ContentHash, "doc1.txt"));
        assert!(!processed.known_id(DedupKey::Both, "doc1.txt"));

        // renamed copy
        assert!(processed.known_content(DedupKey::ContentHash, "copy.txt", "h1"));
        assert!(!processed.known_content(DedupKey::Both, "copy.txt", "h1"));

        // edited in place
        assert!(processed.known_content(DedupKey::Identifier, "doc1.txt", "h2"));
        assert!(!processed.known_content(DedupKey::ContentHash, "doc1.txt", "h2"));
        assert!(!processed.known_content(DedupKey::Both, "doc1.txt", "h2"));
        assert!(processed.known_content(DedupKey::Both, "doc1.txt", "h1"));
    }
}
