//! # namedeck Catalog Service Library (namedeck-swipe)
//!
//! Tiered name catalog and swipe session engine.
//!
//! **Purpose:** Resolve entry ids from a chunked offline dataset through a bounded
//! resident cache, search it through the id-only index manifest, and walk curated decks
//! with like / dislike / superlike decisions that persist across restarts.
//!
//! **Architecture:** `TieredCatalog` owns all entry loading; `SearchIndex`, `DeckStore`
//! and `SwipeSession` sit on top of it and are served over HTTP/SSE by the binary.

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod deck;
pub mod error;
pub mod search;
pub mod session;

pub use catalog::TieredCatalog;
pub use error::{Error, Result};
pub use session::SwipeSession;
