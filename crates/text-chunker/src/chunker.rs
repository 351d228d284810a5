use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::types::Passage;
use std::collections::VecDeque;

/// Main chunker interface for splitting document text into passages
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker, rejecting invalid configurations
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split text into ordered passage texts.
    ///
    /// Splitting is hierarchical: the coarsest separator present in the text is tried first
    /// and only pieces that are still too large are re-split with the finer separators.
    /// Adjacent pieces are then greedily packed into passages of at most `chunk_size`
    /// characters, carrying up to `overlap` trailing characters into the next passage.
    #[must_use]
    pub fn chunk_str(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &self.config.separators)
    }

    /// Split a source document into passages tagged with their source and sequence number
    #[must_use]
    pub fn chunk_source(&self, source: &str, text: &str) -> Vec<Passage> {
        let passages: Vec<Passage> = self
            .chunk_str(text)
            .into_iter()
            .enumerate()
            .map(|(seq, chunk)| Passage::new(source.to_string(), seq, chunk))
            .collect();
        log::debug!("Split {source} into {} passages", passages.len());
        passages
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let pieces = split_keep_separator(text, separator);

        let mut out = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                out.extend(self.merge_pieces(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                if let Some(doc) = self.finish(piece.to_string()) {
                    out.push(doc);
                }
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            out.extend(self.merge_pieces(&pending));
        }
        out
    }

    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.overlap;

        let mut docs = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > chunk_size && !window.is_empty() {
                if let Some(doc) = self.finish(concat(&window)) {
                    docs.push(doc);
                }
                // Keep at most `overlap` trailing characters, and make room for the next piece.
                while total > overlap || (total > 0 && total + len > chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        if let Some(doc) = self.finish(concat(&window)) {
            docs.push(doc);
        }
        docs
    }

    fn finish(&self, doc: String) -> Option<String> {
        let doc = if self.config.strip_whitespace {
            doc.trim().to_string()
        } else {
            doc
        };
        (!doc.is_empty()).then_some(doc)
    }
}

/// Split text into passages with the default separators.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = Chunker::new(ChunkerConfig::new(chunk_size, overlap))?;
    Ok(chunker.chunk_str(text))
}

fn pick_separator<'s>(text: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
    for (idx, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[idx + 1..]);
        }
    }
    (separators.last().map_or("", String::as_str), &[])
}

/// Split on `separator`, keeping it attached to the end of the preceding piece so no text is lost.
fn split_keep_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, matched) in text.match_indices(separator) {
        let end = idx + matched.len();
        if end > start {
            pieces.push(&text[start..end]);
        }
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn concat(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(piece, _)| *piece).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
