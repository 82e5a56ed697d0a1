//! One-pass shard build.
//!
//! Streams the embeddings CSV (`cord_uid,v1,...,vK`, no header) once and
//! spreads its rows over a bounded number of shard files, recording in a
//! [`ShardIndex`] which shard every identifier went to.
//!
//! The build is all-or-nothing from the reader's point of view: shards are
//! written as they fill up, but the index that makes them reachable is only
//! returned (and only persisted by the caller) once every shard is on disk.
//! A failed build must be rerun from scratch.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info};

use super::{shard_capacity, Shard, ShardIndex, ShardName};
use crate::models::{BuildOptions, Embedding};
use crate::storage::{ShardStorage, StorageError};
use crate::store::{StoreError, StoreResult};

/// Statistics from a shard build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Source rows read, duplicates included
    pub rows_read: usize,

    /// Embeddings stored in a shard
    pub embeddings_written: usize,

    /// Rows skipped because their identifier was already indexed
    pub duplicates_skipped: usize,

    /// Shard files written
    pub shards_written: usize,

    /// Embedding length shared by every stored row
    pub dimension: Option<usize>,
}

impl BuildStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stored embedding.
    pub fn record_written(&mut self) {
        self.rows_read += 1;
        self.embeddings_written += 1;
    }

    /// Record a duplicate row that was skipped.
    pub fn record_duplicate(&mut self) {
        self.rows_read += 1;
        self.duplicates_skipped += 1;
    }

    /// Record a persisted shard.
    pub fn record_shard(&mut self) {
        self.shards_written += 1;
    }
}

/// Output of a completed build.
#[derive(Debug, Clone)]
pub struct ShardBuild {
    /// Identifier -> shard assignment for every stored embedding
    pub index: ShardIndex,

    /// What the build did
    pub stats: BuildStats,
}

/// Writes the embeddings corpus out as shards.
///
/// # Example
/// ```no_run
/// use std::fs::File;
/// use cord19_papers::{BuildOptions, ShardWriter, ShardStorage};
/// use cord19_papers::storage::json::JsonShardStorage;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = JsonShardStorage::new("project_data/embedding_dicts", "project_data/embeddings_index.json");
/// storage.ensure_dirs()?;
///
/// let writer = ShardWriter::new(&storage, 128_492, &BuildOptions::default())?;
/// let build = writer.write(File::open("cord_19_embeddings.csv")?)?;
/// storage.write_index(&build.index)?;
/// # Ok(())
/// # }
/// ```
pub struct ShardWriter<S: ShardStorage> {
    /// Storage the shards are written to
    storage: S,

    /// Embeddings per shard
    per_shard: usize,

    /// Required embedding length, if known up front
    expected_dimension: Option<usize>,
}

impl<S: ShardStorage> ShardWriter<S> {
    /// Create a writer sized for `total` identifiers.
    ///
    /// `total` comes from the paper index; the shards hold
    /// `total / shard_count + 1` embeddings each.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidOptions` if `options.shard_count` is zero
    pub fn new(storage: S, total: usize, options: &BuildOptions) -> StoreResult<Self> {
        if options.shard_count == 0 {
            return Err(StoreError::InvalidOptions(
                "shard count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            storage,
            per_shard: shard_capacity(total, options.shard_count),
            expected_dimension: options.expected_dimension,
        })
    }

    /// Embeddings stored per shard.
    pub fn per_shard(&self) -> usize {
        self.per_shard
    }

    /// Run the build over `source`.
    pub fn write<R: Read>(&self, source: R) -> StoreResult<ShardBuild> {
        self.write_with_progress(source, |_| {})
    }

    /// Run the build over `source`, calling `on_shard` after every shard file
    /// is persisted.
    ///
    /// # Errors
    /// - `StoreError::MalformedInput` for a row with an empty identifier, an
    ///   unparsable value, or a length differing from the other rows
    /// - `StoreError::Storage` if reading the source or writing a shard fails
    pub fn write_with_progress<R, F>(&self, source: R, mut on_shard: F) -> StoreResult<ShardBuild>
    where
        R: Read,
        F: FnMut(&BuildStats),
    {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source);

        let mut index = ShardIndex::new();
        let mut stats = BuildStats::new();
        stats.dimension = self.expected_dimension;

        let mut counter = 1;
        let mut buffer = Shard::with_capacity(self.per_shard);

        info!(per_shard = self.per_shard, "building embedding shards");

        for record in reader.records() {
            let record = record.map_err(source_error)?;
            let row = stats.rows_read + 1;

            let cord_uid = record.get(0).unwrap_or_default();
            if cord_uid.is_empty() {
                return Err(StoreError::MalformedInput {
                    record: row,
                    message: "missing cord_uid".to_string(),
                });
            }
            if index.contains(cord_uid) {
                debug!(cord_uid, row, "skipping duplicate embedding row");
                stats.record_duplicate();
                continue;
            }

            let embedding = parse_embedding(&record, row)?;
            match stats.dimension {
                Some(dimension) if dimension != embedding.len() => {
                    return Err(StoreError::MalformedInput {
                        record: row,
                        message: format!(
                            "expected {} values for `{}`, found {}",
                            dimension,
                            cord_uid,
                            embedding.len()
                        ),
                    });
                }
                Some(_) => {}
                None => stats.dimension = Some(embedding.len()),
            }

            let shard = ShardName::from_counter(counter);
            index.assign(cord_uid.to_string(), shard);
            buffer.insert(cord_uid.to_string(), embedding);
            stats.record_written();

            if buffer.len() >= self.per_shard {
                self.persist(shard, &buffer)?;
                stats.record_shard();
                on_shard(&stats);

                buffer.clear();
                counter += 1;
            }
        }

        if !buffer.is_empty() {
            self.persist(ShardName::from_counter(counter), &buffer)?;
            stats.record_shard();
            on_shard(&stats);
        }

        info!(
            embeddings = stats.embeddings_written,
            shards = stats.shards_written,
            duplicates = stats.duplicates_skipped,
            "embedding shards complete"
        );

        Ok(ShardBuild { index, stats })
    }

    fn persist(&self, name: ShardName, shard: &Shard) -> StoreResult<()> {
        info!(shard = %name, entries = shard.len(), "persisting shard");
        self.storage.write_shard(name, shard)?;
        Ok(())
    }
}

fn parse_embedding(record: &StringRecord, row: usize) -> StoreResult<Embedding> {
    let values = record
        .iter()
        .skip(1)
        .enumerate()
        .map(|(column, field)| {
            field.trim().parse::<f32>().map_err(|e| StoreError::MalformedInput {
                record: row,
                message: format!("value {} (`{}`): {}", column + 1, field, e),
            })
        })
        .collect::<StoreResult<Embedding>>()?;

    if values.is_empty() {
        return Err(StoreError::MalformedInput {
            record: row,
            message: "row has no embedding values".to_string(),
        });
    }
    Ok(values)
}

/// Classify a CSV reader failure: I/O problems are storage failures, anything
/// else (bad UTF-8, ...) is malformed input.
fn source_error(error: csv::Error) -> StoreError {
    let record = error
        .position()
        .map(|p| p.record() as usize + 1)
        .unwrap_or_default();

    match error.into_kind() {
        csv::ErrorKind::Io(e) => StorageError::io("<embeddings source>", e).into(),
        other => StoreError::MalformedInput {
            record,
            message: format!("{:?}", other),
        },
    }
}
