//! Sharding of the embedding corpus.
//!
//! The embeddings file is far too large to keep in memory, so it is split once
//! into a bounded number of shard files. This module holds the pieces of that
//! scheme:
//!
//! - [`ShardName`]: the fixed-width name of one shard file
//! - [`ShardIndex`]: which shard each `cord_uid` landed in
//! - [`ShardWriter`]: the one-pass build that produces shards and index
//! - [`ShardCache`]: the single-slot cache of the last loaded shard

mod cache;
mod index;
mod writer;

pub use cache::ShardCache;
pub use index::ShardIndex;
pub use writer::{BuildStats, ShardBuild, ShardWriter};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::models::Embedding;

/// The decoded contents of one shard file.
pub type Shard = HashMap<String, Embedding>;

/// Prefix shared by every shard file name.
pub const SHARD_PREFIX: &str = "embeddings_dict_";

/// Number of distinct shard names the 3-digit scheme can express.
pub const SHARD_NAME_SPACE: usize = 1000;

/// Name of a shard file, e.g. `embeddings_dict_007`.
///
/// Names are produced from a 1-based counter rendered with three digits. The
/// counter wraps modulo 1000, so counter 1001 renders exactly like counter 1:
/// builds with more than 999 shards would reuse names. Deployments use at most
/// a few hundred shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardName(u16);

impl ShardName {
    /// Name for the given build counter value.
    pub fn from_counter(counter: usize) -> Self {
        ShardName((counter % SHARD_NAME_SPACE) as u16)
    }

    /// Numeric part of the name (0-999).
    pub fn number(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", SHARD_PREFIX, self.0)
    }
}

/// Error returned when a string is not a valid shard name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid shard name `{0}`: expected `embeddings_dict_` followed by three digits")]
pub struct ParseShardNameError(String);

impl FromStr for ShardName {
    type Err = ParseShardNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(SHARD_PREFIX)
            .filter(|d| d.len() == 3 && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ParseShardNameError(s.to_string()))?;
        digits
            .parse()
            .map(ShardName)
            .map_err(|_| ParseShardNameError(s.to_string()))
    }
}

impl Serialize for ShardName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShardName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Number of embeddings stored per shard.
///
/// This is `total / shard_count + 1`, not a true ceiling: when `total` divides
/// evenly the shards still get one slot of slack, so fewer than `shard_count`
/// shards may be written. Existing builds depend on this sizing.
///
/// # Panics
/// Panics if `shard_count` is zero; [`ShardWriter::new`] rejects that first.
pub fn shard_capacity(total: usize, shard_count: usize) -> usize {
    total / shard_count + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_digit_counter() {
        assert_eq!(ShardName::from_counter(3).to_string(), "embeddings_dict_003");
    }

    #[test]
    fn test_two_digit_counter() {
        assert_eq!(ShardName::from_counter(83).to_string(), "embeddings_dict_083");
    }

    #[test]
    fn test_three_digit_counter() {
        assert_eq!(ShardName::from_counter(837).to_string(), "embeddings_dict_837");
    }

    #[test]
    fn test_counter_wraps_past_999() {
        assert_eq!(ShardName::from_counter(1000).to_string(), "embeddings_dict_000");
        assert_eq!(ShardName::from_counter(1001), ShardName::from_counter(1));
    }

    #[test]
    fn test_parse_round_trip() {
        let name: ShardName = "embeddings_dict_042".parse().unwrap();
        assert_eq!(name, ShardName::from_counter(42));
        assert_eq!(name.number(), 42);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        for bad in ["embeddings_dict_42", "embeddings_dict_0042", "dict_042", "embeddings_dict_4x2", ""] {
            assert!(bad.parse::<ShardName>().is_err(), "`{}` should not parse", bad);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&ShardName::from_counter(5)).unwrap();
        assert_eq!(json, "\"embeddings_dict_005\"");
        assert!(serde_json::from_str::<ShardName>("\"nope\"").is_err());
    }

    #[test]
    fn test_shard_capacity_is_floor_plus_one() {
        assert_eq!(shard_capacity(5, 3), 2);
        assert_eq!(shard_capacity(6, 3), 3);
        assert_eq!(shard_capacity(0, 100), 1);
        assert_eq!(shard_capacity(128_492, 100), 1285);
    }
}
