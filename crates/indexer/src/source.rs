use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Formats read directly as UTF-8 text; anything else needs an external extractor.
const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown"];

/// Formats recognised as documents even though this crate cannot extract them.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "odt"];

/// One logical document offered for ingestion.
///
/// `source_id` must be stable and unique per document; it is the deduplication key.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn source_id(&self) -> &str;

    /// Plain text of the document
    async fn extract(&self) -> Result<String>;
}

#[async_trait]
impl<T: DocumentSource + ?Sized> DocumentSource for Box<T> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    async fn extract(&self) -> Result<String> {
        (**self).extract().await
    }
}

/// Already-extracted `(source_id, text)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    id: String,
    text: String,
}

impl TextDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for TextDocument {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn extract(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Document file on disk, identified by its file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDocument {
    id: String,
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let id = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IndexerError::InvalidPath(format!("no usable file name: {}", path.display()))
            })?
            .to_string();
        Ok(Self { id, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

#[async_trait]
impl DocumentSource for FileDocument {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn extract(&self) -> Result<String> {
        let ext = self.extension().unwrap_or_default();
        if !TEXT_EXTENSIONS.contains(&ext.as_str()) {
            let reason = if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
                format!("'.{ext}' documents require an external text extractor")
            } else {
                format!("unsupported file format '{ext}'")
            };
            return Err(IndexerError::extraction(&self.id, reason));
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|err| IndexerError::extraction(&self.id, err.to_string()))?;
        String::from_utf8(bytes)
            .map_err(|err| IndexerError::extraction(&self.id, format!("not valid UTF-8: {err}")))
    }
}

/// Upload folder: every regular, non-hidden file directly inside `root`
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Scan the folder; documents are returned sorted by source id
    pub fn scan(&self) -> Result<Vec<FileDocument>> {
        if !self.root.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "Not a directory: {}",
                self.root.display()
            )));
        }

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .max_depth(Some(1))
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false);

        let mut documents = Vec::new();
        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                        continue;
                    }
                    match FileDocument::new(entry.path()) {
                        Ok(doc) => documents.push(doc),
                        Err(err) => log::warn!("Skipping {}: {err}", entry.path().display()),
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        log::info!(
            "Found {} documents in {}",
            documents.len(),
            self.root.display()
        );
        Ok(documents)
    }
}
