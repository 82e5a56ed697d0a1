//! Identifier -> shard lookup table.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ShardName;
use crate::ordered::OrderedMap;
use crate::store::{StoreError, StoreResult};

/// Maps every `cord_uid` of the embeddings corpus to the shard holding it.
///
/// Entries keep the order the identifiers appeared in the source file, which
/// is also the order shards were filled in. Traversing the index in order
/// therefore visits each shard in one contiguous run.
///
/// The index is built once by [`ShardWriter`](super::ShardWriter) and is
/// read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardIndex {
    entries: OrderedMap<ShardName>,
}

impl ShardIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `cord_uid` lives in `shard`.
    ///
    /// The first assignment wins: returns `false` and changes nothing if the
    /// identifier is already indexed.
    pub fn assign(&mut self, cord_uid: String, shard: ShardName) -> bool {
        self.entries.insert_new(cord_uid, shard)
    }

    /// Find the shard holding `cord_uid`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the identifier was never indexed
    pub fn resolve(&self, cord_uid: &str) -> StoreResult<ShardName> {
        self.entries
            .get(cord_uid)
            .copied()
            .ok_or_else(|| StoreError::NotFound(cord_uid.to_string()))
    }

    pub fn contains(&self, cord_uid: &str) -> bool {
        self.entries.contains_key(cord_uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifier at `position` in index order.
    pub fn id_at(&self, position: usize) -> Option<&str> {
        self.entries.get_index(position).map(|(id, _)| id)
    }

    /// Identifiers in index order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.keys()
    }

    /// `(cord_uid, shard)` pairs in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, ShardName)> {
        self.entries.iter().map(|(id, shard)| (id, *shard))
    }

    /// Distinct shards referenced by the index.
    pub fn shard_names(&self) -> BTreeSet<ShardName> {
        self.entries.values().copied().collect()
    }
}
