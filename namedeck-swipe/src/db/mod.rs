//! Database access layer
//!
//! SQLite holds the key/value settings table and persisted swipe sessions.

pub mod init;
pub mod settings;
pub mod snapshot;

pub use init::{create_tables, init_database};
pub use snapshot::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
