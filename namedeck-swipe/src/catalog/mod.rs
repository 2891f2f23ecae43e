//! Tiered catalog
//!
//! Chunked dataset loading behind a bounded resident cache.

pub mod annotations;
pub mod chunk_store;
pub mod loader;
pub mod partition;
pub mod resident;
pub mod seed;
pub mod source;

pub use loader::{CatalogOptions, CatalogStatus, Resolution, TieredCatalog};
pub use partition::PartitionTable;
pub use source::{open_source, DataSource, Resource};
