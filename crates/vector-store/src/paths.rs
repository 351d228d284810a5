use std::path::{Path, PathBuf};

/// Store directory used when none is configured
pub const DEFAULT_STORE_DIR: &str = "data/knowledge";

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const LOCK_FILE_NAME: &str = "index.lock";
pub const CONFIG_FILE_NAME: &str = "knowledge.toml";

const INDEX_FILE_PREFIX: &str = "index-";
const METADATA_FILE_PREFIX: &str = "metadata-";
const TEMP_SUFFIX: &str = ".tmp";

#[must_use]
pub fn manifest_path(store_dir: &Path) -> PathBuf {
    store_dir.join(MANIFEST_FILE_NAME)
}

#[must_use]
pub fn lock_path(store_dir: &Path) -> PathBuf {
    store_dir.join(LOCK_FILE_NAME)
}

/// `knowledge.toml` lives next to the store directory, not inside it, so a rebuild that wipes
/// the store keeps the configuration.
#[must_use]
pub fn config_path_for_store(store_dir: &Path) -> PathBuf {
    store_dir
        .parent()
        .map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), |p| p.join(CONFIG_FILE_NAME))
}

#[must_use]
pub fn index_file_name(generation: u64) -> String {
    format!("{INDEX_FILE_PREFIX}{generation:08}.bin")
}

#[must_use]
pub fn metadata_file_name(generation: u64) -> String {
    format!("{METADATA_FILE_PREFIX}{generation:08}.json")
}

/// Whether `name` is a generation file (index blob or metadata) owned by the store
#[must_use]
pub fn is_generation_file_name(name: &str) -> bool {
    (name.starts_with(INDEX_FILE_PREFIX) && name.ends_with(".bin"))
        || (name.starts_with(METADATA_FILE_PREFIX) && name.ends_with(".json"))
}

/// Generation number encoded in a generation file name
#[must_use]
pub fn generation_of_file_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(INDEX_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(".bin"))
        .or_else(|| {
            name.strip_prefix(METADATA_FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
        })?;
    digits.parse().ok()
}

/// Whether `name` is a temp file written by [`temp_path_for`] for a store file
#[must_use]
pub fn is_temp_file_name(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
        && (name.starts_with(INDEX_FILE_PREFIX)
            || name.starts_with(METADATA_FILE_PREFIX)
            || name.starts_with(MANIFEST_FILE_NAME))
}

/// Sibling path used while a file is being written, renamed into place once complete.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(".{}{TEMP_SUFFIX}", std::process::id()));
    path.with_file_name(name)
}
