//! # Knowledge Text Chunker
//!
//! Splits extracted document text into overlapping passages sized for embedding.
//!
//! ## Strategy
//!
//! ```text
//! Document text
//!     │
//!     ├──> Paragraphs ("\n\n")
//!     │      └─> still too long? lines ("\n")
//!     │             └─> sentences (".") ─> words (" ") ─> characters
//!     │
//!     └──> Greedy packing
//!            ├─> passages of at most `chunk_size` characters
//!            └─> `overlap` trailing characters repeated in the next passage
//! ```
//!
//! ## Example
//!
//! ```rust
//! use knowledge_text_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::new(40, 8)).unwrap();
//! let passages = chunker.chunk_source(
//!     "handbook.txt",
//!     "Vacation requests go through the portal.\n\nExpenses are reimbursed monthly.",
//! );
//! for passage in passages {
//!     println!("#{} {}", passage.sequence_no, passage.text);
//! }
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::{chunk, Chunker};
pub use config::{default_separators, ChunkerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
pub use error::{ChunkerError, Result};
pub use types::Passage;
