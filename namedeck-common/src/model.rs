//! Catalog data model
//!
//! Types shared between the catalog service and anything that reads entries from it.
//! Field names on the wire follow the offline dataset packaging: entries use the compact
//! single-letter keys (`n`, `g`, `r`, ...), manifests use camelCase keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Rank assigned to entries without popularity data
pub const UNRANKED: u32 = 999_999;

// ============================================================================
// Entries
// ============================================================================

/// Gender code of a catalog entry
///
/// Unknown codes in the packaging are read as `Unisex`, which is also what the
/// deck builder does with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unisex,
}

impl Gender {
    /// Single-letter code used in chunk files and index buckets
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Unisex => "U",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "M" | "m" => Gender::Male,
            "F" | "f" => Gender::Female,
            _ => Gender::Unisex,
        }
    }
}

impl From<String> for Gender {
    fn from(code: String) -> Self {
        Gender::from_code(&code)
    }
}

impl From<Gender> for String {
    fn from(gender: Gender) -> Self {
        gender.code().to_string()
    }
}

/// One immutable catalog record
///
/// Identity fields are fixed at dataset-build time. The light annotation fields
/// (`categories`, `styles`, `lists`, `meaning_short`) are whatever the chunk file
/// carried; later annotations are merged through the catalog's annotation side-map and
/// never written back here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,

    #[serde(rename = "n")]
    pub name: String,

    #[serde(rename = "g", default)]
    pub gender: Gender,

    #[serde(rename = "r", default = "default_rank")]
    pub rank: u32,

    #[serde(rename = "o", default = "default_origin")]
    pub origin: String,

    /// Name length in characters
    #[serde(rename = "l", default)]
    pub length: u32,

    #[serde(rename = "s", default)]
    pub syllables: u32,

    /// Popularity score
    #[serde(rename = "p", default)]
    pub popularity: f64,

    /// Loading tier (0 = core)
    #[serde(rename = "t", default)]
    pub tier: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lists: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning_short: Option<String>,
}

fn default_rank() -> u32 {
    UNRANKED
}

fn default_origin() -> String {
    "unknown".to_string()
}

impl CatalogEntry {
    /// Lowercased display name, the key used by the exact-name lookup table
    pub fn lookup_key(&self) -> String {
        self.name.to_lowercase()
    }
}

// ============================================================================
// Dataset packaging
// ============================================================================

/// Header of a chunk file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "chunk", alias = "name")]
    pub name: String,
    pub count: usize,
    /// Generation timestamp as written by the dataset builder
    #[serde(default)]
    pub generated: String,
}

/// A chunk file: `names-{chunk}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFile {
    pub metadata: ChunkMetadata,
    #[serde(rename = "names", alias = "entries", default)]
    pub entries: Vec<CatalogEntry>,
}

/// Per-chunk summary inside the catalog manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub count: usize,
    #[serde(default)]
    pub first_id: u32,
    #[serde(default)]
    pub last_id: u32,
}

/// Catalog manifest: `names-metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated: String,
    pub total_names: usize,
    #[serde(default)]
    pub chunks: HashMap<String, ChunkSummary>,
}

/// Search index manifest: `names-index.json`
///
/// Every bucket maps a key to entry ids only; entry bodies always come from chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    #[serde(default)]
    pub by_letter: HashMap<String, Vec<u32>>,
    #[serde(default)]
    pub by_gender: HashMap<String, Vec<u32>>,
    #[serde(default)]
    pub by_origin: HashMap<String, Vec<u32>>,
    #[serde(default)]
    pub by_category: HashMap<String, Vec<u32>>,
    #[serde(default)]
    pub by_style: HashMap<String, Vec<u32>>,
    #[serde(default)]
    pub by_list: HashMap<String, Vec<u32>>,
    /// Lowercased name -> id
    #[serde(default)]
    pub lookup: HashMap<String, u32>,
}

/// Deck manifest: `swipe-decks.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckManifest {
    #[serde(default)]
    pub quick: Vec<u32>,
    #[serde(default)]
    pub full: Vec<u32>,
    #[serde(default)]
    pub male: Vec<u32>,
    #[serde(default)]
    pub female: Vec<u32>,
    #[serde(default)]
    pub unisex: Vec<u32>,
    #[serde(default)]
    pub categories: HashMap<String, Vec<u32>>,
}

impl DeckManifest {
    /// Ids for one deck type, `None` if the manifest has no such deck
    pub fn ids(&self, deck_type: &DeckType) -> Option<&[u32]> {
        match deck_type {
            DeckType::Quick => Some(&self.quick),
            DeckType::Full => Some(&self.full),
            DeckType::Male => Some(&self.male),
            DeckType::Female => Some(&self.female),
            DeckType::Unisex => Some(&self.unisex),
            DeckType::Category(name) => self.categories.get(name).map(Vec::as_slice),
        }
    }
}

// ============================================================================
// Swipe session
// ============================================================================

/// Curated browsing sequence
///
/// Written as `quick`, `full`, `male`, `female`, `unisex` or `category:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeckType {
    #[default]
    Quick,
    Full,
    Male,
    Female,
    Unisex,
    Category(String),
}

impl fmt::Display for DeckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckType::Quick => write!(f, "quick"),
            DeckType::Full => write!(f, "full"),
            DeckType::Male => write!(f, "male"),
            DeckType::Female => write!(f, "female"),
            DeckType::Unisex => write!(f, "unisex"),
            DeckType::Category(name) => write!(f, "category:{}", name),
        }
    }
}

impl FromStr for DeckType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "quick" => Ok(DeckType::Quick),
            "full" => Ok(DeckType::Full),
            "male" => Ok(DeckType::Male),
            "female" => Ok(DeckType::Female),
            "unisex" => Ok(DeckType::Unisex),
            other => match other.strip_prefix("category:") {
                Some(name) if !name.is_empty() => Ok(DeckType::Category(name.to_string())),
                _ => Err(Error::InvalidInput(format!("Unknown deck type: {}", other))),
            },
        }
    }
}

impl TryFrom<String> for DeckType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeckType> for String {
    fn from(deck_type: DeckType) -> Self {
        deck_type.to_string()
    }
}

/// A swipe decision
///
/// Also accepts the gesture names (`right`, `left`, `up`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    #[serde(alias = "right")]
    Like,
    #[serde(alias = "left")]
    Dislike,
    #[serde(alias = "up", alias = "super_like")]
    Superlike,
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwipeDirection::Like => write!(f, "like"),
            SwipeDirection::Dislike => write!(f, "dislike"),
            SwipeDirection::Superlike => write!(f, "superlike"),
        }
    }
}

/// Durable record of one browsing session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub liked_ids: Vec<u32>,
    #[serde(default)]
    pub disliked_ids: Vec<u32>,
    #[serde(default)]
    pub super_liked_ids: Vec<u32>,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub deck_type: DeckType,
}
