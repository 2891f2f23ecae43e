//! Deck manifest store
//!
//! `swipe-decks.json` is fetched once (concurrent callers share the fetch) and served
//! per deck type as immutable id sequences. A failed fetch is not cached.

use crate::catalog::source::{DataSource, Resource};
use crate::error::{Error, Result};
use namedeck_common::model::DeckManifest;
use namedeck_common::DeckType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub struct DeckStore {
    source: Arc<dyn DataSource>,
    manifest: OnceCell<Arc<DeckManifest>>,
    decks: Mutex<HashMap<DeckType, Arc<[u32]>>>,
}

impl DeckStore {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            manifest: OnceCell::new(),
            decks: Mutex::new(HashMap::new()),
        }
    }

    async fn manifest(&self) -> Result<Arc<DeckManifest>> {
        let manifest = self
            .manifest
            .get_or_try_init(|| async {
                let bytes = self.source.fetch(&Resource::Decks).await.map_err(|e| {
                    warn!("Deck manifest fetch failed: {}", e);
                    Error::Deck(format!("Deck manifest unavailable: {}", e))
                })?;
                let manifest: DeckManifest = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Deck(format!("Deck manifest is malformed: {}", e)))?;
                info!(
                    quick = manifest.quick.len(),
                    full = manifest.full.len(),
                    categories = manifest.categories.len(),
                    "Loaded deck manifest"
                );
                Ok::<_, Error>(Arc::new(manifest))
            })
            .await?;

        Ok(Arc::clone(manifest))
    }

    /// Ordered ids of one deck
    pub async fn deck(&self, deck_type: &DeckType) -> Result<Arc<[u32]>> {
        if let Some(deck) = self.lock_decks().get(deck_type) {
            return Ok(Arc::clone(deck));
        }

        let manifest = self.manifest().await?;
        let ids = manifest
            .ids(deck_type)
            .ok_or_else(|| Error::Deck(format!("No deck named '{}'", deck_type)))?;
        let deck: Arc<[u32]> = Arc::from(ids);

        self.lock_decks().insert(deck_type.clone(), Arc::clone(&deck));
        Ok(deck)
    }

    /// Deck types offered by the manifest, with their lengths
    pub async fn available(&self) -> Result<Vec<(DeckType, usize)>> {
        let manifest = self.manifest().await?;
        let mut decks = vec![
            (DeckType::Quick, manifest.quick.len()),
            (DeckType::Full, manifest.full.len()),
            (DeckType::Male, manifest.male.len()),
            (DeckType::Female, manifest.female.len()),
            (DeckType::Unisex, manifest.unisex.len()),
        ];
        let mut categories: Vec<_> = manifest
            .categories
            .iter()
            .map(|(name, ids)| (DeckType::Category(name.clone()), ids.len()))
            .collect();
        categories.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
        decks.extend(categories);
        Ok(decks)
    }

    fn lock_decks(&self) -> std::sync::MutexGuard<'_, HashMap<DeckType, Arc<[u32]>>> {
        match self.decks.lock() {
            Ok(decks) => decks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
