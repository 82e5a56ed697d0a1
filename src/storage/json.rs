//! JSON file storage implementation.
//!
//! This module provides a filesystem implementation of the `ShardStorage`
//! trait. Every shard is one JSON object (`{cord_uid: [f32, ...]}`) stored in
//! the shards folder under its shard name; the shard index is one JSON object
//! (`{cord_uid: shard_name}`) stored next to it.
//!
//! The generic `read_json` / `write_json` helpers are shared with the paper
//! index and the document reader.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{ShardStorage, StorageError, StorageResult};
use crate::shard::{Shard, ShardIndex, ShardName};

/// Filesystem-backed shard storage.
///
/// # Layout
/// ```text
/// <project_data>/
/// +-- embeddings_index.json     # shard index
/// +-- embedding_dicts/
///     +-- embeddings_dict_001   # shard 1
///     +-- embeddings_dict_002
///     +-- ...
/// ```
#[derive(Debug, Clone)]
pub struct JsonShardStorage {
    /// Folder holding the shard files
    shards_dir: PathBuf,

    /// Path of the shard index file
    index_path: PathBuf,
}

impl JsonShardStorage {
    /// Create a storage rooted at the given locations.
    ///
    /// Nothing is touched on disk until the first read or write.
    pub fn new(shards_dir: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            shards_dir: shards_dir.into(),
            index_path: index_path.into(),
        }
    }

    /// Path of the file backing `name`.
    pub fn shard_path(&self, name: ShardName) -> PathBuf {
        self.shards_dir.join(name.to_string())
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Create the shards folder (and its parents) if missing.
    pub fn ensure_dirs(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.shards_dir).map_err(|e| StorageError::io(&self.shards_dir, e))
    }
}

impl ShardStorage for JsonShardStorage {
    fn write_shard(&self, name: ShardName, shard: &Shard) -> StorageResult<()> {
        let path = self.shard_path(name);
        debug!(shard = %name, entries = shard.len(), path = %path.display(), "writing shard");
        write_json(&path, shard)
    }

    fn read_shard(&self, name: ShardName) -> StorageResult<Shard> {
        let path = self.shard_path(name);
        debug!(shard = %name, path = %path.display(), "reading shard");
        read_json(&path)
    }

    fn write_index(&self, index: &ShardIndex) -> StorageResult<()> {
        write_json(&self.index_path, index)
    }

    fn read_index(&self) -> StorageResult<Option<ShardIndex>> {
        read_json_if_exists(&self.index_path)
    }
}

/// Read and decode a JSON file.
///
/// # Errors
/// Returns `StorageError::Io` if the file cannot be read and
/// `StorageError::Corrupt` if its contents are not the expected JSON
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    decode(path, file)
}

/// Like [`read_json`], but a missing file yields `Ok(None)`.
pub fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match File::open(path) {
        Ok(file) => decode(path, file).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn decode<T: DeserializeOwned>(path: &Path, file: File) -> StorageResult<T> {
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        if e.is_io() {
            StorageError::io(path, e.into())
        } else {
            StorageError::corrupt(path, e)
        }
    })
}

/// Encode `value` as JSON and write it to `path`.
///
/// The data goes to a sibling `.partial` file first and is renamed into place
/// once fully flushed, so `path` never holds a truncated document.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let partial = partial_path(path);

    let file = File::create(&partial).map_err(|e| StorageError::io(&partial, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| {
        if e.is_io() {
            StorageError::io(&partial, e.into())
        } else {
            StorageError::corrupt(&partial, e)
        }
    })?;
    writer.flush().map_err(|e| StorageError::io(&partial, e))?;
    drop(writer);

    fs::rename(&partial, path).map_err(|e| StorageError::io(path, e))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> JsonShardStorage {
        let storage = JsonShardStorage::new(
            dir.path().join("embedding_dicts"),
            dir.path().join("embeddings_index.json"),
        );
        storage.ensure_dirs().unwrap();
        storage
    }

    #[test]
    fn test_shard_file_naming() {
        let storage = JsonShardStorage::new("project_data/embedding_dicts", "idx.json");
        assert_eq!(
            storage.shard_path(ShardName::from_counter(7)),
            PathBuf::from("project_data/embedding_dicts/embeddings_dict_007")
        );
    }

    #[test]
    fn test_shard_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let name = ShardName::from_counter(1);

        let mut shard: Shard = HashMap::new();
        shard.insert("ug7v899j".to_string(), vec![-3.5420954, 0.1, 1e-7, 42.0]);
        shard.insert("02tnwd4m".to_string(), vec![0.0, -0.0, 123456.79, -2.25]);

        storage.write_shard(name, &shard).unwrap();
        assert!(storage.shard_path(name).is_file());
        assert!(!dir.path().join("embedding_dicts/embeddings_dict_001.partial").exists());

        let loaded = storage.read_shard(name).unwrap();
        assert_eq!(loaded, shard);
    }

    #[test]
    fn test_missing_shard_is_io_error() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        match storage.read_shard(ShardName::from_counter(42)) {
            Err(StorageError::Io { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_shard_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let name = ShardName::from_counter(3);
        fs::write(storage.shard_path(name), b"{\"abc\": [1.0, \"oops\"]}").unwrap();

        match storage.read_shard(name) {
            Err(StorageError::Corrupt { path, .. }) => assert_eq!(path, storage.shard_path(name)),
            other => panic!("Expected Corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_index_absent_until_written() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert!(storage.read_index().unwrap().is_none());

        let mut index = ShardIndex::new();
        index.assign("b".to_string(), ShardName::from_counter(1));
        index.assign("a".to_string(), ShardName::from_counter(2));
        storage.write_index(&index).unwrap();

        let raw = fs::read_to_string(storage.index_path()).unwrap();
        assert_eq!(raw, r#"{"b":"embeddings_dict_001","a":"embeddings_dict_002"}"#);
        assert_eq!(storage.read_index().unwrap(), Some(index));
    }

    #[test]
    fn test_write_json_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("value.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        write_json(&path, &vec![4]).unwrap();

        let value: Vec<u8> = read_json(&path).unwrap();
        assert_eq!(value, vec![4]);
    }
}
