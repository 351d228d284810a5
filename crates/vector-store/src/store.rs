use crate::error::{Result, VectorStoreError};
use crate::flat_index::VectorIndex;
use crate::metadata::{MetadataStore, PassageRecord};
use crate::paths::{
    generation_of_file_name, index_file_name, is_generation_file_name, is_temp_file_name,
    manifest_path, metadata_file_name, temp_path_for,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Restarts of a load whose generation kept being replaced underneath it
const LOAD_ATTEMPTS: usize = 8;

/// Commit record of the store: names the index/metadata pair that forms the current state.
///
/// Generation files are written first and the manifest is swapped in last with an atomic
/// rename, so readers and crash recovery always see a complete pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub schema_version: u32,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub index_file: String,
    pub metadata_file: String,
    pub index_sha256: String,
    pub metadata_sha256: String,
    pub updated_at_unix_ms: u64,
}

/// One nearest-neighbor hit joined with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: usize,
    pub distance: f32,
    pub record: PassageRecord,
}

/// The persisted corpus: a [`VectorIndex`] and its id-aligned [`MetadataStore`].
///
/// Both halves are only mutated together through [`KnowledgeStore::append`], so the record
/// count and positional alignment of the two always agree.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    dir: PathBuf,
    index: VectorIndex,
    metadata: MetadataStore,
    generation: u64,
    embedding_model: Option<String>,
}

impl KnowledgeStore {
    /// Fresh, dimension-unset store rooted at `dir` (nothing is read or written)
    pub fn empty(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            index: VectorIndex::new(),
            metadata: MetadataStore::new(),
            generation: 0,
            embedding_model: None,
        }
    }

    /// Empty store that commits as the generation after the one on disk at `dir`.
    ///
    /// Used by rebuilds: the previous state stays readable until the new manifest lands.
    pub async fn empty_successor(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let generation = match read_manifest(dir).await {
            Ok(Some(manifest)) => manifest.generation,
            _ => 0,
        };
        Self {
            generation,
            ..Self::empty(dir)
        }
    }

    /// Load the committed state from `dir`, or an empty store when nothing was persisted yet.
    ///
    /// A manifest that points at missing, altered, or misaligned files is reported as
    /// [`VectorStoreError::CorruptPersistedState`]; it is never reset silently. A generation
    /// replaced by a concurrent writer between reading the manifest and reading its files is
    /// not corruption: the load restarts from the new manifest.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut attempt = 0;
        loop {
            let Some(manifest) = read_manifest(dir).await? else {
                log::info!("No knowledge store at {}; starting empty", dir.display());
                return Ok(Self::empty(dir));
            };
            let generation = manifest.generation;
            let err = match Self::load_generation(dir, manifest).await {
                Ok(store) => return Ok(store),
                Err(err @ VectorStoreError::CorruptPersistedState(_)) => err,
                Err(err) => return Err(err),
            };

            attempt += 1;
            let current = read_manifest(dir).await?.map(|m| m.generation);
            if current == Some(generation) || attempt >= LOAD_ATTEMPTS {
                return Err(err);
            }
            log::debug!("Generation {generation} was replaced while loading ({err}); retrying");
        }
    }

    async fn load_generation(dir: &Path, manifest: StoreManifest) -> Result<Self> {
        if manifest.schema_version != STORE_SCHEMA_VERSION {
            return Err(VectorStoreError::corrupt(format!(
                "Unsupported store schema_version {} (expected {STORE_SCHEMA_VERSION})",
                manifest.schema_version
            )));
        }

        let index_bytes = read_generation_file(dir, &manifest.index_file).await?;
        verify_checksum(&manifest.index_file, &index_bytes, &manifest.index_sha256)?;
        let metadata_bytes = read_generation_file(dir, &manifest.metadata_file).await?;
        verify_checksum(&manifest.metadata_file, &metadata_bytes, &manifest.metadata_sha256)?;

        let index = VectorIndex::from_bytes(&index_bytes)?;
        let metadata = MetadataStore::from_json(&metadata_bytes)?;

        if index.len() != metadata.len() || index.len() != manifest.count {
            return Err(VectorStoreError::corrupt(format!(
                "index holds {} vectors, metadata {} records, manifest declares {}",
                index.len(),
                metadata.len(),
                manifest.count
            )));
        }
        if index.dimension() != manifest.dimension {
            return Err(VectorStoreError::corrupt(format!(
                "index dimension {:?} disagrees with manifest {:?}",
                index.dimension(),
                manifest.dimension
            )));
        }

        log::info!(
            "Loaded knowledge store generation {} ({} records) from {}",
            manifest.generation,
            index.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
            metadata,
            generation: manifest.generation,
            embedding_model: manifest.embedding_model,
        })
    }

    /// Append a batch of vectors and their records as one step.
    ///
    /// Fails without modifying anything when the batch is misaligned or any vector disagrees
    /// with the established dimension.
    pub fn append(
        &mut self,
        vectors: &[Vec<f32>],
        records: Vec<PassageRecord>,
    ) -> Result<Range<usize>> {
        if vectors.len() != records.len() {
            return Err(VectorStoreError::MisalignedBatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }
        let ids = self.index.add(vectors)?;
        self.metadata.append(records);
        debug_assert_eq!(self.index.len(), self.metadata.len());
        Ok(ids)
    }

    /// Nearest records to `query`, ascending by squared Euclidean distance
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let neighbors = self.index.search(query, k)?;
        neighbors
            .into_iter()
            .map(|(id, distance)| {
                let record = self.metadata.get(id).cloned().ok_or_else(|| {
                    VectorStoreError::corrupt(format!("no metadata for index id {id}"))
                })?;
                Ok(SearchHit {
                    id,
                    distance,
                    record,
                })
            })
            .collect()
    }

    /// Write the current state as a new generation and commit it by swapping the manifest.
    pub async fn persist(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let generation = self.generation + 1;
        let index_file = index_file_name(generation);
        let metadata_file = metadata_file_name(generation);

        let index_bytes = self.index.to_bytes();
        let metadata_bytes = self.metadata.to_json()?;
        write_atomic(&self.dir.join(&index_file), &index_bytes).await?;
        write_atomic(&self.dir.join(&metadata_file), &metadata_bytes).await?;

        let manifest = StoreManifest {
            schema_version: STORE_SCHEMA_VERSION,
            generation,
            dimension: self.index.dimension(),
            count: self.index.len(),
            embedding_model: self.embedding_model.clone(),
            index_sha256: sha256_hex(&index_bytes),
            metadata_sha256: sha256_hex(&metadata_bytes),
            index_file,
            metadata_file,
            updated_at_unix_ms: unix_now_ms(),
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&manifest_path(&self.dir), &manifest_bytes).await?;
        self.generation = generation;

        log::info!(
            "Persisted knowledge store generation {generation} ({} records) to {}",
            manifest.count,
            self.dir.display()
        );
        self.remove_stale_generations(&manifest).await;
        Ok(())
    }

    /// Delete every persisted file of the store at `dir` (explicit rebuild path).
    pub async fn destroy(dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        match tokio::fs::remove_file(manifest_path(dir)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_generation_file_name(&name) || is_temp_file_name(&name) {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        log::info!("Removed knowledge store at {}", dir.display());
        Ok(())
    }

    /// Remove generations older than the previous one, plus temp files left by crashed writers.
    ///
    /// The previous generation stays on disk so a reader that picked up the old manifest just
    /// before this commit can still open its files.
    async fn remove_stale_generations(&self, current: &StoreManifest) {
        let keep_from = current.generation.saturating_sub(1);
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let stale = if is_temp_file_name(&name) {
                true
            } else {
                generation_of_file_name(&name).is_some_and(|generation| generation < keep_from)
            };
            if !stale {
                continue;
            }
            if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                log::debug!("Failed to remove stale store file {name}: {err}");
            }
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[must_use]
    pub const fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub const fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    /// Generation of the last commit this store was loaded from or persisted as (0 = never)
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Sources that already contributed records
    #[must_use]
    pub fn processed_sources(&self) -> BTreeSet<String> {
        self.metadata.sources()
    }

    #[must_use]
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    pub fn set_embedding_model(&mut self, model_id: impl Into<String>) {
        self.embedding_model = Some(model_id.into());
    }
}

/// Read the committed manifest, `None` when the store was never persisted
pub async fn read_manifest(dir: &Path) -> Result<Option<StoreManifest>> {
    let path = manifest_path(dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|err| {
        VectorStoreError::corrupt(format!("manifest {} is unreadable: {err}", path.display()))
    })
}

async fn read_generation_file(dir: &Path, name: &str) -> Result<Vec<u8>> {
    if !is_generation_file_name(name) || name.contains(['/', '\\']) {
        return Err(VectorStoreError::corrupt(format!(
            "manifest references unexpected file {name:?}"
        )));
    }
    match tokio::fs::read(dir.join(name)).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(VectorStoreError::corrupt(
            format!("manifest references missing file {name}"),
        )),
        Err(err) => Err(err.into()),
    }
}

fn verify_checksum(name: &str, bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(VectorStoreError::corrupt(format!(
            "checksum mismatch for {name}: expected {expected}, found {actual}"
        )));
    }
    Ok(())
}

/// Write `bytes` to a temp sibling, flush it to disk, then rename over `path`.
///
/// The parent directory is synced after the rename so the new directory entry is durable too.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path_for(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    sync_parent_dir(path).await
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::File::open(parent).await?.sync_all().await?;
    Ok(())
}

// Directory handles cannot be opened for syncing on this platform.
#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
