use serde::{Deserialize, Serialize};

/// A passage of source text small enough to embed and retrieve on its own
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Passage {
    /// Identifier of the document the passage was cut from
    pub source: String,

    /// Position of the passage within its source (0-indexed)
    pub sequence_no: usize,

    /// Passage text
    pub text: String,
}

impl Passage {
    /// Create a new passage
    #[must_use]
    pub const fn new(source: String, sequence_no: usize, text: String) -> Self {
        Self {
            source,
            sequence_no,
            text,
        }
    }

    /// Length of the passage in characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_len_counts_unicode_scalars() {
        let passage = Passage::new("doc.txt".into(), 0, "naïve café".into());
        assert_eq!(passage.char_len(), 10);
        assert!(passage.text.len() > 10);
    }
}
