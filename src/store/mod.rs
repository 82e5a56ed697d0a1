//! Embedding lookup over the sharded store.
//!
//! [`EmbeddingStore`] owns the shard index and the single-slot shard cache and
//! answers "what is the embedding of this paper?" by resolving the paper's
//! shard, fetching that shard through the cache, and reading the vector out of
//! it.
//!
//! # Usage
//!
//! ```no_run
//! use std::fs::File;
//! use cord19_papers::{BuildOptions, EmbeddingStore};
//! use cord19_papers::storage::json::JsonShardStorage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = JsonShardStorage::new("project_data/embedding_dicts", "project_data/embeddings_index.json");
//! storage.ensure_dirs()?;
//!
//! // Builds on the first run, loads the persisted index afterwards.
//! let mut store = EmbeddingStore::open_or_build(storage, 128_492, &BuildOptions::default(), || {
//!     File::open("cord_19_embeddings.csv")
//! })?;
//!
//! let embedding = store.embedding_for("ug7v899j")?;
//! assert_eq!(embedding.len(), 768);
//! # Ok(())
//! # }
//! ```

use std::io::{self, Read};

use thiserror::Error;
use tracing::info;

use crate::models::{BuildOptions, Embedding};
use crate::shard::{BuildStats, ShardCache, ShardIndex, ShardName, ShardWriter};
use crate::storage::{ShardStorage, StorageError};

/// Errors that can occur while building or querying the embedding store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The identifier has no entry in the shard index
    #[error("No embedding indexed for paper: {0}")]
    NotFound(String),

    /// The index points at a shard that does not hold the identifier. This
    /// means the shards and the index on disk disagree.
    #[error("Paper {id} is indexed in {shard} but missing from that shard")]
    InconsistentShard { id: String, shard: ShardName },

    /// A source row could not be turned into an embedding
    #[error("Malformed embeddings row {record}: {message}")]
    MalformedInput { record: usize, message: String },

    /// Build options that cannot produce a store
    #[error("Invalid build options: {0}")]
    InvalidOptions(String),

    /// Reading or writing a shard or the index failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Identifier -> embedding lookup backed by shards.
///
/// The store exclusively owns its index and its cache slot. Lookups take
/// `&mut self` because a lookup may replace the cached shard; hosts that need
/// to share a store across threads must wrap it in a lock.
pub struct EmbeddingStore<S: ShardStorage> {
    index: ShardIndex,
    cache: ShardCache<S>,
}

impl<S: ShardStorage> EmbeddingStore<S> {
    /// Create a store from an index and the storage holding its shards.
    pub fn new(index: ShardIndex, storage: S) -> Self {
        Self {
            index,
            cache: ShardCache::new(storage),
        }
    }

    /// Open a store from a previously persisted index.
    ///
    /// # Returns
    /// `None` if the storage holds no index yet
    ///
    /// # Errors
    /// Returns `StoreError::Storage` if the index exists but cannot be read
    pub fn open(storage: S) -> StoreResult<Option<Self>> {
        Ok(storage
            .read_index()?
            .map(|index| Self::new(index, storage)))
    }

    /// Build the shards from `source`, then persist the index.
    ///
    /// The index is written only after the last shard, so an interrupted
    /// build never leaves a loadable index behind.
    ///
    /// # Arguments
    /// * `storage` - Destination of the shards and the index
    /// * `source` - The embeddings CSV
    /// * `total` - Number of papers the shards are sized for
    /// * `options` - Shard count and expected dimension
    /// * `on_shard` - Progress callback, called after each shard is written
    pub fn build<R, F>(
        storage: S,
        source: R,
        total: usize,
        options: &BuildOptions,
        on_shard: F,
    ) -> StoreResult<(Self, BuildStats)>
    where
        R: Read,
        F: FnMut(&BuildStats),
    {
        let build = ShardWriter::new(&storage, total, options)?.write_with_progress(source, on_shard)?;
        storage.write_index(&build.index)?;
        info!(entries = build.index.len(), "shard index persisted");

        Ok((Self::new(build.index, storage), build.stats))
    }

    /// Load the persisted index, or build everything if there is none.
    ///
    /// `source` is only opened when a build is needed. Running this again on
    /// a built store does not touch the shards.
    pub fn open_or_build<R, F>(
        storage: S,
        total: usize,
        options: &BuildOptions,
        source: F,
    ) -> StoreResult<Self>
    where
        R: Read,
        F: FnOnce() -> io::Result<R>,
    {
        Self::open_or_build_with_progress(storage, total, options, source, |_| {})
            .map(|(store, _)| store)
    }

    /// Like [`open_or_build`](Self::open_or_build), reporting build progress.
    ///
    /// # Returns
    /// The store, plus the build statistics when a build actually ran
    pub fn open_or_build_with_progress<R, F, P>(
        storage: S,
        total: usize,
        options: &BuildOptions,
        source: F,
        on_shard: P,
    ) -> StoreResult<(Self, Option<BuildStats>)>
    where
        R: Read,
        F: FnOnce() -> io::Result<R>,
        P: FnMut(&BuildStats),
    {
        if let Some(index) = storage.read_index()? {
            info!(entries = index.len(), "loaded shard index");
            return Ok((Self::new(index, storage), None));
        }

        info!(total, shard_count = options.shard_count, "no shard index found, building");
        let source = source().map_err(|e| StorageError::io("<embeddings source>", e))?;
        let (store, stats) = Self::build(storage, source, total, options, on_shard)?;
        Ok((store, Some(stats)))
    }

    /// The shard index.
    pub fn index(&self) -> &ShardIndex {
        &self.index
    }

    /// Find the shard holding `cord_uid`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the identifier is not indexed
    pub fn resolve(&self, cord_uid: &str) -> StoreResult<ShardName> {
        self.index.resolve(cord_uid)
    }

    /// Get the embedding of `cord_uid`.
    ///
    /// Loads the paper's shard only if it is not the one already cached.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if the identifier is not indexed
    /// - `StoreError::Storage` if the shard file is missing or corrupt
    /// - `StoreError::InconsistentShard` if the shard lacks the identifier
    pub fn embedding_for(&mut self, cord_uid: &str) -> StoreResult<Embedding> {
        let shard_name = self.index.resolve(cord_uid)?;
        let shard = self.cache.get(shard_name)?;

        shard
            .get(cord_uid)
            .cloned()
            .ok_or_else(|| StoreError::InconsistentShard {
                id: cord_uid.to_string(),
                shard: shard_name,
            })
    }

    /// Iterate over every indexed paper's embedding, in index order.
    ///
    /// Each call starts a fresh traversal. Consecutive papers share a shard,
    /// so each shard file is loaded at most once per traversal.
    pub fn embeddings(&mut self) -> Embeddings<'_, S> {
        Embeddings {
            store: self,
            position: 0,
        }
    }

    /// Number of shard files loaded so far.
    pub fn shard_loads(&self) -> usize {
        self.cache.loads()
    }

    /// Shard currently held in memory.
    pub fn cached_shard(&self) -> Option<ShardName> {
        self.cache.cached()
    }
}

/// Lazy traversal of the store in index order.
///
/// Yields `(cord_uid, embedding)` pairs. An error is yielded in place of the
/// entry that caused it; iteration can continue past it.
pub struct Embeddings<'a, S: ShardStorage> {
    store: &'a mut EmbeddingStore<S>,
    position: usize,
}

impl<S: ShardStorage> Iterator for Embeddings<'_, S> {
    type Item = StoreResult<(String, Embedding)>;

    fn next(&mut self) -> Option<Self::Item> {
        let cord_uid = self.store.index.id_at(self.position)?.to_string();
        self.position += 1;

        Some(
            self.store
                .embedding_for(&cord_uid)
                .map(|embedding| (cord_uid, embedding)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.store.index.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl<S: ShardStorage> ExactSizeIterator for Embeddings<'_, S> {}
