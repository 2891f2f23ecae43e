//! Embedded bootstrap seed
//!
//! A handful of top-ranked entries compiled into the binary so the first screen has
//! something to show before `core` arrives. The seed is never inserted into the
//! resident cache and is ignored once `core` is loaded.

use namedeck_common::model::ChunkFile;
use namedeck_common::CatalogEntry;
use std::sync::Arc;
use tracing::error;

const SEED_JSON: &str = include_str!("../../data/seed.json");

/// Parse the embedded seed; an unreadable seed degrades to an empty one
pub fn bootstrap_seed() -> Vec<Arc<CatalogEntry>> {
    match serde_json::from_str::<ChunkFile>(SEED_JSON) {
        Ok(file) => file.entries.into_iter().map(Arc::new).collect(),
        Err(e) => {
            error!("Embedded seed is malformed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_parses_and_is_core_range() {
        let seed = bootstrap_seed();

        assert!(!seed.is_empty());
        assert!(seed.iter().all(|e| e.id < 1_000));
        assert_eq!(seed[0].rank, 1);
    }
}
