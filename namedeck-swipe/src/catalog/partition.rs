//! Static ID -> chunk boundary table
//!
//! Chunks are contiguous, disjoint ranges of entry-id space. The table is shipped with
//! the service and never fetched: resolving an id to its chunk needs no I/O.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::ops::Range;

/// Name of the first, always-preferred chunk
pub const CORE_CHUNK: &str = "core";

/// Monotonic boundary table: each chunk owns `[previous upper, upper)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    boundaries: Vec<(u32, String)>,
}

impl Default for PartitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PartitionTable {
    /// Boundaries matching the published dataset packaging
    pub fn standard() -> Self {
        Self {
            boundaries: vec![
                (1_000, CORE_CHUNK.to_string()),
                (10_000, "popular".to_string()),
                (50_000, "chunk-1".to_string()),
                (100_000, "chunk-2".to_string()),
                (230_000, "chunk-3".to_string()),
            ],
        }
    }

    /// Build a custom table; upper bounds must be strictly increasing and names unique
    pub fn new(boundaries: Vec<(u32, String)>) -> Result<Self> {
        if boundaries.is_empty() {
            return Err(Error::Config("Partition table needs at least one chunk".to_string()));
        }

        let mut previous = 0u32;
        let mut seen = HashMap::new();
        for (upper, name) in &boundaries {
            if *upper <= previous {
                return Err(Error::Config(format!(
                    "Partition bound {} for '{}' is not above {}",
                    upper, name, previous
                )));
            }
            if seen.insert(name.as_str(), ()).is_some() {
                return Err(Error::Config(format!("Duplicate chunk name '{}'", name)));
            }
            previous = *upper;
        }

        Ok(Self { boundaries })
    }

    /// Owning chunk of an id, `None` past the last boundary
    pub fn chunk_for_id(&self, id: u32) -> Option<&str> {
        let idx = self.boundaries.partition_point(|(upper, _)| *upper <= id);
        self.boundaries.get(idx).map(|(_, name)| name.as_str())
    }

    /// Id range owned by a chunk
    pub fn range_of(&self, name: &str) -> Option<Range<u32>> {
        let mut lower = 0u32;
        for (upper, chunk) in &self.boundaries {
            if chunk == name {
                return Some(lower..*upper);
            }
            lower = *upper;
        }
        None
    }

    pub fn contains_chunk(&self, name: &str) -> bool {
        self.boundaries.iter().any(|(_, chunk)| chunk == name)
    }

    /// Chunk names in id order
    pub fn chunk_names(&self) -> impl Iterator<Item = &str> {
        self.boundaries.iter().map(|(_, name)| name.as_str())
    }

    /// The lowest chunk, served first and kept by `trim_to_core`
    pub fn core_chunk(&self) -> &str {
        // new() rejects an empty table
        self.boundaries
            .first()
            .map(|(_, name)| name.as_str())
            .unwrap_or(CORE_CHUNK)
    }

    /// Group ids by owning chunk, chunks in order of first appearance
    ///
    /// Ids without a chunk are left out.
    pub fn group_by_chunk(&self, ids: &[u32]) -> Vec<(String, Vec<u32>)> {
        let mut groups: Vec<(String, Vec<u32>)> = Vec::new();
        let mut slot_of: HashMap<&str, usize> = HashMap::new();

        for &id in ids {
            let Some(chunk) = self.chunk_for_id(id) else {
                continue;
            };
            match slot_of.get(chunk) {
                Some(&slot) => groups[slot].1.push(id),
                None => {
                    slot_of.insert(chunk, groups.len());
                    groups.push((chunk.to_string(), vec![id]));
                }
            }
        }

        groups
    }
}
