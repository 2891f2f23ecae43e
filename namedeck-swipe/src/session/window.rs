//! Window materialization
//!
//! Turns a run of deck ids into resolved cards. Every returned card holds one pin on its
//! entry; whoever owns the card must unpin it when the card leaves the windows.

use crate::catalog::loader::{Resolution, TieredCatalog};
use namedeck_common::CatalogEntry;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// A resolved card plus the deck slots passed over just before it
#[derive(Debug, Clone)]
pub struct PreparedCard {
    pub entry: Arc<CatalogEntry>,
    /// Excluded or unknown deck slots between the previous card and this one
    pub skipped_before: usize,
}

#[derive(Debug, Default)]
pub struct Batch {
    pub cards: Vec<PreparedCard>,
    /// Deck index just past the last slot examined
    pub next_cursor: usize,
    /// Slots passed over after the last card
    pub trailing_skipped: usize,
}

impl Batch {
    pub fn entry_ids(&self) -> Vec<u32> {
        self.cards.iter().map(|card| card.entry.id).collect()
    }
}

/// Resolve up to `want` cards from `deck[cursor..]`, leaving out `excluded` ids
///
/// Ids that are not in the catalog are passed over like excluded ones, so a batch may
/// examine more than `want` slots. A slot whose chunk failed to load ends the batch
/// there; `next_cursor` points at it so the next call retries. Loads are batched per
/// chunk through the catalog.
pub async fn materialize(
    catalog: &TieredCatalog,
    deck: &[u32],
    cursor: usize,
    want: usize,
    excluded: &HashSet<u32>,
) -> Batch {
    let mut batch = Batch {
        cards: Vec::with_capacity(want),
        next_cursor: cursor.min(deck.len()),
        trailing_skipped: 0,
    };
    let mut carry = 0usize;

    'batch: while batch.cards.len() < want && batch.next_cursor < deck.len() {
        // (deck index, id, slots passed over since the previous candidate)
        let mut candidates: Vec<(usize, u32, usize)> = Vec::new();
        let mut passed = 0usize;
        while candidates.len() < want - batch.cards.len() && batch.next_cursor < deck.len() {
            let index = batch.next_cursor;
            let id = deck[index];
            batch.next_cursor += 1;
            if excluded.contains(&id) {
                passed += 1;
            } else {
                candidates.push((index, id, passed));
                passed = 0;
            }
        }

        let ids: Vec<u32> = candidates.iter().map(|(_, id, _)| *id).collect();
        catalog.pin_many(&ids);
        let outcomes = catalog.resolve_outcomes(&ids).await;

        for (offset, ((index, id, skipped), outcome)) in candidates.iter().zip(outcomes).enumerate() {
            carry += skipped;
            match outcome {
                Resolution::Loaded(entry) => {
                    batch.cards.push(PreparedCard {
                        entry,
                        skipped_before: carry,
                    });
                    carry = 0;
                }
                Resolution::NotFound => {
                    catalog.unpin(*id);
                    carry += 1;
                }
                Resolution::LoadFailed(e) => {
                    warn!(id = *id, deck_index = *index, error = %e, "Card unavailable, stopping window here");
                    catalog.unpin_many(&ids[offset..]);
                    batch.next_cursor = *index;
                    break 'batch;
                }
            }
        }
        carry += passed;
    }

    batch.trailing_skipped = carry;
    batch
}
