//! # namedeck Common Library
//!
//! Shared code for the namedeck catalog service and its consumers:
//! - Catalog data model (entries, chunk files, manifests, decks, session snapshots)
//! - Event types (`NamedeckEvent`) and the broadcast `EventBus`
//! - TOML bootstrap configuration and root folder resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::{CatalogEntry, DeckType, Gender, SwipeDirection};
