//! Single-slot shard cache.

use tracing::debug;

use super::{Shard, ShardName};
use crate::storage::{ShardStorage, StorageResult};

/// Keeps the most recently loaded shard in memory.
///
/// Capacity is exactly one shard: a request for any other shard evicts the
/// resident one before the new file is read. Lookups in index order touch each
/// shard in one contiguous run, so this captures nearly every possible hit
/// while bounding memory to a single decoded shard.
///
/// The cache is not synchronized. Callers that share it across threads must
/// serialize access themselves (e.g. one cache per worker, or a `Mutex`).
pub struct ShardCache<S: ShardStorage> {
    /// Backend the shards are loaded from
    storage: S,

    /// The resident shard, if any
    slot: Option<(ShardName, Shard)>,

    /// Number of shard files loaded so far
    loads: usize,
}

impl<S: ShardStorage> ShardCache<S> {
    /// Create an empty cache over `storage`.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            slot: None,
            loads: 0,
        }
    }

    /// Get the decoded contents of shard `name`.
    ///
    /// Returns the resident shard without any I/O when `name` is already
    /// cached. Otherwise the resident shard is evicted and `name` is loaded in
    /// its place. A failed load leaves the cache empty.
    ///
    /// # Errors
    /// Returns the `StorageError` of a missing or corrupt shard file; the load
    /// is not retried
    pub fn get(&mut self, name: ShardName) -> StorageResult<&Shard> {
        match self.slot.take() {
            Some(entry) if entry.0 == name => {
                debug!(shard = %name, "shard cache hit");
                Ok(&self.slot.insert(entry).1)
            }
            evicted => {
                match &evicted {
                    Some((previous, _)) => {
                        debug!(shard = %name, evicted = %previous, "shard cache miss")
                    }
                    None => debug!(shard = %name, "shard cache miss (empty)"),
                }
                drop(evicted);

                let shard = self.storage.read_shard(name)?;
                self.loads += 1;
                Ok(&self.slot.insert((name, shard)).1)
            }
        }
    }

    /// Name of the resident shard.
    pub fn cached(&self) -> Option<ShardName> {
        self.slot.as_ref().map(|(name, _)| *name)
    }

    /// Number of shard files loaded since the cache was created.
    pub fn loads(&self) -> usize {
        self.loads
    }

    /// Drop the resident shard.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}
