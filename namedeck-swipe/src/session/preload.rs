//! Next-window preloading
//!
//! The session keeps a second, unexposed window of prepared cards. When it runs low the
//! session submits a `PreloadRequest`; a single worker task materializes the batch
//! without holding any session lock and appends it to the slot. Every request carries the
//! generation it was made for, and a batch whose generation no longer matches (the session
//! was reset or re-initialized meanwhile) is released instead of appended.

use crate::catalog::loader::TieredCatalog;
use crate::session::window::{materialize, Batch, PreparedCard};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Prepared cards waiting to enter the current window
#[derive(Debug, Default)]
pub struct NextWindow {
    pub generation: u64,
    pub cards: VecDeque<PreparedCard>,
    /// Next deck index to materialize
    pub cursor: usize,
    /// Slots passed over after the last prepared card
    pub trailing_skipped: usize,
    /// Submitted requests not yet applied
    pub pending: usize,
}

impl NextWindow {
    fn append(&mut self, batch: Batch) {
        let mut cards = batch.cards.into_iter();
        match cards.next() {
            Some(mut first) => {
                first.skipped_before += self.trailing_skipped;
                self.cards.push_back(first);
                self.cards.extend(cards);
                self.trailing_skipped = batch.trailing_skipped;
            }
            None => self.trailing_skipped += batch.trailing_skipped,
        }
        self.cursor = batch.next_cursor;
    }
}

pub struct NextWindowSlot {
    window: Mutex<NextWindow>,
    changed: Notify,
}

impl Default for NextWindowSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl NextWindowSlot {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(NextWindow::default()),
            changed: Notify::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, NextWindow> {
        match self.window.lock() {
            Ok(window) => window,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start a new generation, returning the cards dropped from the old one
    pub fn reset(&self, generation: u64) -> Vec<PreparedCard> {
        let dropped = {
            let mut window = self.lock();
            let dropped = window.cards.drain(..).collect();
            *window = NextWindow {
                generation,
                ..NextWindow::default()
            };
            dropped
        };
        self.changed.notify_waiters();
        dropped
    }

    /// Seed the current generation with a batch materialized in the foreground
    pub fn seed(&self, generation: u64, batch: Batch) -> bool {
        let mut window = self.lock();
        if window.generation != generation {
            return false;
        }
        window.append(batch);
        true
    }

    /// Wait until no submitted request is outstanding
    pub async fn settled(&self) {
        loop {
            // Created before the check so a notification in between is not lost
            let notified = self.changed.notified();
            if self.lock().pending == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Request to extend the next window of one generation
#[derive(Debug, Clone)]
pub struct PreloadRequest {
    pub generation: u64,
    pub deck: Arc<[u32]>,
    pub want: usize,
    /// Dislikes at submission time
    pub excluded: Arc<HashSet<u32>>,
}

/// Handle to the preload worker task
///
/// The worker stops when the handle is dropped.
pub struct PreloadWorker {
    tx: mpsc::UnboundedSender<PreloadRequest>,
}

impl PreloadWorker {
    /// Spawn the worker (requires a Tokio runtime)
    pub fn spawn(catalog: Arc<TieredCatalog>, slot: Arc<NextWindowSlot>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(catalog, slot, rx));
        Self { tx }
    }

    /// Queue a request; false if the worker is gone
    pub fn submit(&self, request: PreloadRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

async fn worker_loop(
    catalog: Arc<TieredCatalog>,
    slot: Arc<NextWindowSlot>,
    mut rx: mpsc::UnboundedReceiver<PreloadRequest>,
) {
    while let Some(request) = rx.recv().await {
        let cursor = {
            let window = slot.lock();
            (window.generation == request.generation).then_some(window.cursor)
        };
        let Some(cursor) = cursor else {
            debug!(generation = request.generation, "Dropping stale preload request");
            continue;
        };

        let batch = materialize(&catalog, &request.deck, cursor, request.want, &request.excluded).await;

        let stale = {
            let mut window = slot.lock();
            if window.generation == request.generation {
                debug!(
                    generation = request.generation,
                    cards = batch.cards.len(),
                    cursor = batch.next_cursor,
                    "Preloaded next window"
                );
                window.append(batch);
                window.pending = window.pending.saturating_sub(1);
                None
            } else {
                Some(batch.entry_ids())
            }
        };
        if let Some(ids) = stale {
            debug!(generation = request.generation, "Discarding preload for a superseded session");
            catalog.unpin_many(&ids);
        }
        slot.changed.notify_waiters();
    }
    debug!("Preload worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::CatalogOptions;
    use crate::catalog::source::{MemorySource, Resource};
    use namedeck_common::events::EventBus;

    fn catalog(ids: std::ops::Range<u32>) -> Arc<TieredCatalog> {
        let names: Vec<_> = ids
            .map(|id| serde_json::json!({"id": id, "n": format!("Name{}", id)}))
            .collect();
        let source = Arc::new(MemorySource::new());
        source.insert(
            Resource::Chunk("core".into()),
            serde_json::to_vec(&serde_json::json!({
                "metadata": {"chunk": "core", "count": names.len()},
                "names": names,
            }))
            .unwrap(),
        );
        Arc::new(TieredCatalog::new(
            source,
            CatalogOptions::default(),
            Arc::new(EventBus::new(16)),
        ))
    }

    fn request(generation: u64, deck: &[u32]) -> PreloadRequest {
        PreloadRequest {
            generation,
            deck: Arc::from(deck),
            want: 2,
            excluded: Arc::new(HashSet::new()),
        }
    }

    #[tokio::test]
    async fn test_worker_appends_matching_generation() {
        let catalog = catalog(0..10);
        let slot = Arc::new(NextWindowSlot::new());
        let worker = PreloadWorker::spawn(catalog, Arc::clone(&slot));
        slot.reset(1);
        slot.lock().pending = 1;

        assert!(worker.submit(request(1, &[4, 5, 6])));
        slot.settled().await;

        let window = slot.lock();
        let ids: Vec<u32> = window.cards.iter().map(|c| c.entry.id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(window.cursor, 2);
    }

    #[tokio::test]
    async fn test_stale_request_is_not_applied() {
        let catalog = catalog(0..10);
        let slot = Arc::new(NextWindowSlot::new());
        let worker = PreloadWorker::spawn(Arc::clone(&catalog), Arc::clone(&slot));
        slot.reset(2);
        slot.lock().pending = 1;

        assert!(worker.submit(request(1, &[1, 2])));
        assert!(worker.submit(request(2, &[7, 8])));
        slot.settled().await;

        let ids: Vec<u32> = slot.lock().cards.iter().map(|c| c.entry.id).collect();
        assert_eq!(ids, vec![7, 8]);
        assert!(!catalog.is_pinned(1));
    }

    #[tokio::test]
    async fn test_seed_rejects_other_generation() {
        let catalog = catalog(0..10);
        let slot = NextWindowSlot::new();
        slot.reset(2);

        let batch = materialize(&catalog, &[1, 2], 0, 2, &HashSet::new()).await;
        assert!(!slot.seed(1, batch));
        assert!(slot.lock().cards.is_empty());
    }

    #[test]
    fn test_append_carries_trailing_slots() {
        let mut window = NextWindow::default();
        window.append(Batch {
            cards: Vec::new(),
            next_cursor: 3,
            trailing_skipped: 3,
        });
        let entry: namedeck_common::CatalogEntry =
            serde_json::from_value(serde_json::json!({"id": 9, "n": "Nine"})).unwrap();
        window.append(Batch {
            cards: vec![PreparedCard {
                entry: Arc::new(entry),
                skipped_before: 1,
            }],
            next_cursor: 5,
            trailing_skipped: 0,
        });

        assert_eq!(window.cards[0].skipped_before, 4);
        assert_eq!(window.trailing_skipped, 0);
        assert_eq!(window.cursor, 5);
    }
}
