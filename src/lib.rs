//! CORD-19 Papers - an on-disk index over the CORD-19 paper corpus.
//!
//! This library indexes the CORD-19 metadata and its precomputed SPECTER
//! document embeddings, so any paper's text or embedding can be fetched by its
//! `cord_uid` without re-parsing the multi-gigabyte source files.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - **models**: Core data structures (PaperRecord, CorpusLayout, BuildOptions)
//! - **storage**: Persistence of shards and indexes (JSON files on disk)
//! - **shard**: Shard naming, the shard index, the shard writer and the shard cache
//! - **store**: The embedding lookup facade over the shard index and cache
//! - **metadata**: The paper index built from `metadata.csv`
//! - **corpus**: The top-level object tying papers, text and embeddings together
//! - **timing**: A pausable stopwatch used by the binaries
//!
//! # Workflow
//!
//! ## Build phase (once, offline)
//!
//! 1. Parse `metadata.csv` into the paper index and persist it
//! 2. Stream the embeddings CSV into a bounded number of shard files
//! 3. Persist the identifier -> shard index once every shard is on disk
//!
//! ## Query phase
//!
//! 1. Load both indexes from the project data folder
//! 2. Resolve a `cord_uid` to its shard
//! 3. Serve the embedding from the single-slot shard cache, loading the shard
//!    file only when a different shard is needed
//!
//! # Example
//!
//! ```no_run
//! use cord19_papers::{BuildOptions, Corpus, CorpusLayout};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut corpus = Corpus::open(CorpusLayout::default(), BuildOptions::default())?;
//!
//!     let embedding = corpus.embedding("ug7v899j")?;
//!     println!("{} dimensions", embedding.len());
//!
//!     // Sequential traversal keeps the shard cache warm.
//!     for entry in corpus.embeddings() {
//!         let (cord_uid, embedding) = entry?;
//!         println!("{}: {:?}", cord_uid, &embedding[..3]);
//!     }
//!     Ok(())
//! }
//! ```

pub mod corpus;
pub mod metadata;
pub mod models;
pub mod shard;
pub mod storage;
pub mod store;
pub mod timing;

mod ordered;

// Re-export commonly used types at the crate root
pub use corpus::{Corpus, CorpusError, CorpusResult};
pub use metadata::PaperIndex;
pub use models::{BuildOptions, CorpusLayout, Embedding, PaperRecord};
pub use shard::{BuildStats, ShardCache, ShardIndex, ShardName, ShardWriter};
pub use storage::{ShardStorage, StorageError, StorageResult};
pub use store::{EmbeddingStore, StoreError, StoreResult};
pub use timing::Stopwatch;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of shards the embeddings are spread over
pub const DEFAULT_SHARD_COUNT: usize = 100;

/// Embedding dimension of the CORD-19 SPECTER vectors
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
