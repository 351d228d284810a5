use crate::{IndexerError, Result};
use fs2::FileExt;
use knowledge_vector_store::lock_path;
use std::path::Path;
use std::time::Instant;

/// Exclusive cross-process lock serializing writers of one store directory.
///
/// Readers never take it: they only see committed manifests.
pub(crate) struct IndexWriteLock {
    file: std::fs::File,
}

impl Drop for IndexWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) async fn acquire_index_write_lock(store_dir: &Path) -> Result<IndexWriteLock> {
    tokio::fs::create_dir_all(store_dir).await?;
    let path = lock_path(store_dir);

    let lock = tokio::task::spawn_blocking(move || -> Result<IndexWriteLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                IndexerError::Other(format!("open index lock {}: {err}", path.display()))
            })?;

        let start = Instant::now();
        file.lock_exclusive().map_err(|err| {
            IndexerError::Other(format!("acquire index lock {}: {err}", path.display()))
        })?;
        let waited_ms = start.elapsed().as_millis();
        if waited_ms > 0 {
            log::debug!("Waited {waited_ms}ms for index lock {}", path.display());
        }

        Ok(IndexWriteLock { file })
    })
    .await
    .map_err(|err| IndexerError::Other(format!("join index lock task: {err}")))??;

    Ok(lock)
}
