//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for persisting and retrieving embedding
//! shards and the shard index. The abstraction keeps the shard writer and the
//! shard cache independent of the on-disk format, and lets tests observe
//! exactly how often a shard is loaded.

pub mod json;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::shard::{Shard, ShardIndex, ShardName};

/// Errors that can occur while reading or writing persisted data.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The file could not be opened, read, written or renamed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file was read but its contents do not decode
    #[error("Corrupt file {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        StorageError::Corrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for shard storage backends.
///
/// Shards are written once during the build phase and only read afterwards.
/// All operations are synchronous and blocking; nothing here is retried.
pub trait ShardStorage {
    /// Persist one complete shard under `name`.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the shard cannot be written
    fn write_shard(&self, name: ShardName, shard: &Shard) -> StorageResult<()>;

    /// Load and fully decode the shard stored under `name`.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the shard is missing or unreadable, and
    /// `StorageError::Corrupt` if it does not decode
    fn read_shard(&self, name: ShardName) -> StorageResult<Shard>;

    /// Persist the shard index.
    ///
    /// Callers only do this once every shard has been written, so a present
    /// index always describes a complete build.
    fn write_index(&self, index: &ShardIndex) -> StorageResult<()>;

    /// Load the persisted shard index.
    ///
    /// # Returns
    /// `None` if no index has been built yet
    fn read_index(&self) -> StorageResult<Option<ShardIndex>>;
}

impl<T: ShardStorage + ?Sized> ShardStorage for &T {
    fn write_shard(&self, name: ShardName, shard: &Shard) -> StorageResult<()> {
        (**self).write_shard(name, shard)
    }

    fn read_shard(&self, name: ShardName) -> StorageResult<Shard> {
        (**self).read_shard(name)
    }

    fn write_index(&self, index: &ShardIndex) -> StorageResult<()> {
        (**self).write_index(index)
    }

    fn read_index(&self) -> StorageResult<Option<ShardIndex>> {
        (**self).read_index()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory storage used by the shard and store tests.

    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Mock storage with call counters and failure injection.
    #[derive(Clone, Default)]
    pub struct MockStorage {
        pub state: Arc<Mutex<MockStorageState>>,
    }

    #[derive(Default)]
    pub struct MockStorageState {
        pub shards: HashMap<ShardName, Shard>,
        pub index: Option<ShardIndex>,
        pub shard_writes: Vec<ShardName>,
        pub shard_reads: Vec<ShardName>,
        pub index_writes: usize,
        pub fail_write_on: Option<ShardName>,
    }

    impl MockStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_write_on(self, name: ShardName) -> Self {
            self.state.lock().unwrap().fail_write_on = Some(name);
            self
        }

        pub fn shard_reads(&self) -> Vec<ShardName> {
            self.state.lock().unwrap().shard_reads.clone()
        }

        pub fn shard_writes(&self) -> Vec<ShardName> {
            self.state.lock().unwrap().shard_writes.clone()
        }

        pub fn index_writes(&self) -> usize {
            self.state.lock().unwrap().index_writes
        }

        pub fn shard(&self, name: ShardName) -> Option<Shard> {
            self.state.lock().unwrap().shards.get(&name).cloned()
        }

        pub fn remove_shard(&self, name: ShardName) {
            self.state.lock().unwrap().shards.remove(&name);
        }

        pub fn put_shard(&self, name: ShardName, shard: Shard) {
            self.state.lock().unwrap().shards.insert(name, shard);
        }
    }

    impl ShardStorage for MockStorage {
        fn write_shard(&self, name: ShardName, shard: &Shard) -> StorageResult<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_write_on == Some(name) {
                return Err(StorageError::io(
                    name.to_string(),
                    io::Error::new(io::ErrorKind::Other, "mock write failure"),
                ));
            }
            state.shard_writes.push(name);
            state.shards.insert(name, shard.clone());
            Ok(())
        }

        fn read_shard(&self, name: ShardName) -> StorageResult<Shard> {
            let mut state = self.state.lock().unwrap();
            state.shard_reads.push(name);
            state.shards.get(&name).cloned().ok_or_else(|| {
                StorageError::io(
                    name.to_string(),
                    io::Error::new(io::ErrorKind::NotFound, "no such shard"),
                )
            })
        }

        fn write_index(&self, index: &ShardIndex) -> StorageResult<()> {
            let mut state = self.state.lock().unwrap();
            state.index_writes += 1;
            state.index = Some(index.clone());
            Ok(())
        }

        fn read_index(&self) -> StorageResult<Option<ShardIndex>> {
            Ok(self.state.lock().unwrap().index.clone())
        }
    }
}
