//! Swipe session engine
//!
//! Walks one deck at a time. The session shows a small current window of resolved cards
//! and keeps a second, unexposed next window filled by the preload worker. Decisions,
//! undo and reads run synchronously against in-memory state and never wait on loads;
//! only initialization and the entry helpers suspend.
//!
//! **State machine:** `Uninitialized -> Initializing -> Ready -> Exhausted`. A failed deck
//! fetch returns to `Uninitialized`; `undo` and `reset` leave `Exhausted`.
//!
//! **Position:** counts consumed deck slots. Deciding a card consumes its own slot plus
//! the slots passed over just before it (persisted dislikes, ids missing from the
//! catalog); slots after the last card are consumed when the deck runs out. Undo puts
//! back the position from before the decision.
//!
//! **Lock order:** session state, then next window, then the catalog's resident cache.

use crate::catalog::loader::TieredCatalog;
use crate::db::SnapshotStore;
use crate::deck::DeckStore;
use crate::error::{Error, Result};
use crate::session::decisions::Decisions;
use crate::session::preload::{NextWindowSlot, PreloadRequest, PreloadWorker};
use crate::session::stats::{SessionState, SessionStats, StatsInput};
use crate::session::undo::{UndoRecord, UndoStack};
use crate::session::window::{materialize, PreparedCard};
use chrono::{DateTime, Utc};
use namedeck_common::config::SwipeSettings;
use namedeck_common::events::{EventBus, NamedeckEvent};
use namedeck_common::model::SessionSnapshot;
use namedeck_common::{time, CatalogEntry, DeckType, SwipeDirection};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one recorded decision
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub entry: Arc<CatalogEntry>,
    pub direction: SwipeDirection,
    pub position: usize,
    pub remaining: usize,
    pub exhausted: bool,
}

/// Portable list of liked ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedExport {
    pub liked: Vec<u32>,
    #[serde(default)]
    pub super_liked: Vec<u32>,
    #[serde(default = "time::now")]
    pub export_date: DateTime<Utc>,
    #[serde(default)]
    pub total_swiped: usize,
}

struct SessionInner {
    state: SessionState,
    session_id: Uuid,
    deck_type: DeckType,
    deck: Arc<[u32]>,
    position: usize,
    current: VecDeque<PreparedCard>,
    decisions: Decisions,
    undo: UndoStack,
    /// Bumped whenever the windows are discarded
    generation: u64,
    /// A persisted session was found at open
    resumable: bool,
}

impl SessionInner {
    fn remaining(&self) -> usize {
        self.deck.len().saturating_sub(self.position)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            liked_ids: self.decisions.liked().to_vec(),
            disliked_ids: self.decisions.disliked().to_vec(),
            super_liked_ids: self.decisions.super_liked().to_vec(),
            position: self.position,
            deck_type: self.deck_type.clone(),
        }
    }

    fn stats(&self, loading: bool) -> SessionStats {
        SessionStats::compute(StatsInput {
            state: self.state,
            deck_type: &self.deck_type.to_string(),
            liked: self.decisions.liked().len(),
            disliked: self.decisions.disliked().len(),
            super_liked: self.decisions.super_liked().len(),
            position: self.position,
            deck_len: self.deck.len(),
            undo_available: self.undo.len(),
            loading,
        })
    }
}

pub struct SwipeSession {
    catalog: Arc<TieredCatalog>,
    decks: Arc<DeckStore>,
    snapshots: Arc<dyn SnapshotStore>,
    settings: SwipeSettings,
    events: Arc<EventBus>,
    inner: Mutex<SessionInner>,
    next: Arc<NextWindowSlot>,
    preload: PreloadWorker,
    /// Serializes initialize / resume / reset
    init_gate: tokio::sync::Mutex<()>,
}

impl SwipeSession {
    /// Open the session for `settings.session_key`, restoring persisted decisions
    ///
    /// A snapshot that cannot be read is logged and the session starts empty. The
    /// session stays `Uninitialized` until `initialize` or `resume`.
    pub async fn open(
        catalog: Arc<TieredCatalog>,
        decks: Arc<DeckStore>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: SwipeSettings,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        settings.validate()?;

        let persisted = match snapshots.load(&settings.session_key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(session_key = %settings.session_key, "Failed to read persisted session: {}", e);
                None
            }
        };

        let (decisions, position, deck_type) = match &persisted {
            Some(snapshot) => {
                info!(
                    session_key = %settings.session_key,
                    liked = snapshot.liked_ids.len(),
                    disliked = snapshot.disliked_ids.len(),
                    position = snapshot.position,
                    deck_type = %snapshot.deck_type,
                    "Restored swipe session"
                );
                (
                    Decisions::from_snapshot(snapshot),
                    snapshot.position,
                    snapshot.deck_type.clone(),
                )
            }
            None => (Decisions::default(), 0, DeckType::default()),
        };

        let next = Arc::new(NextWindowSlot::new());
        let preload = PreloadWorker::spawn(Arc::clone(&catalog), Arc::clone(&next));

        Ok(Self {
            catalog,
            decks,
            snapshots,
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                session_id: Uuid::new_v4(),
                deck_type,
                deck: Arc::from(Vec::<u32>::new()),
                position,
                current: VecDeque::new(),
                decisions,
                undo: UndoStack::new(settings.undo_depth),
                generation: 0,
                resumable: persisted.is_some(),
            }),
            settings,
            events,
            next,
            preload,
            init_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &SwipeSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    pub fn session_id(&self) -> Uuid {
        self.lock_inner().session_id
    }

    pub fn deck_type(&self) -> DeckType {
        self.lock_inner().deck_type.clone()
    }

    /// True when a persisted session was found at open
    pub fn is_resumable(&self) -> bool {
        self.lock_inner().resumable
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start `deck_type` from its first slot, keeping existing decisions
    ///
    /// Persisted dislikes never reappear. Fails if the deck cannot be fetched; the
    /// session is then `Uninitialized`.
    pub async fn initialize(&self, deck_type: DeckType) -> Result<SessionStats> {
        let _gate = self.init_gate.lock().await;
        self.initialize_at(deck_type, 0).await
    }

    /// Continue the persisted deck type from the persisted position
    pub async fn resume(&self) -> Result<SessionStats> {
        let _gate = self.init_gate.lock().await;
        let (deck_type, position) = {
            let inner = self.lock_inner();
            (inner.deck_type.clone(), inner.position)
        };
        self.initialize_at(deck_type, position).await
    }

    /// Clear decisions, undo history and position
    ///
    /// An active deck starts over from its first slot; otherwise the session stays
    /// `Uninitialized`.
    pub async fn reset(&self) -> Result<SessionStats> {
        let _gate = self.init_gate.lock().await;

        let (restart, stats) = {
            let mut inner = self.lock_inner();
            let restart = (inner.state != SessionState::Uninitialized).then(|| inner.deck_type.clone());
            self.discard_windows(&mut inner);
            inner.decisions.clear();
            inner.undo.clear();
            inner.position = 0;
            inner.state = SessionState::Uninitialized;
            self.snapshots.save(&self.settings.session_key, &inner.snapshot());
            (restart, inner.stats(false))
        };

        info!("Swipe session reset");
        self.events.emit_lossy(NamedeckEvent::SessionReset { timestamp: time::now() });

        match restart {
            Some(deck_type) => self.initialize_at(deck_type, 0).await,
            None => Ok(stats),
        }
    }

    /// Caller holds `init_gate`
    async fn initialize_at(&self, deck_type: DeckType, start: usize) -> Result<SessionStats> {
        let (generation, excluded) = {
            let mut inner = self.lock_inner();
            self.discard_windows(&mut inner);
            inner.undo.clear();
            inner.state = SessionState::Initializing;
            (inner.generation, inner.decisions.disliked_set())
        };

        let deck = match self.decks.deck(&deck_type).await {
            Ok(deck) => deck,
            Err(e) => {
                error!(deck_type = %deck_type, "Cannot initialize swipe session: {}", e);
                let mut inner = self.lock_inner();
                if inner.generation == generation {
                    inner.state = SessionState::Uninitialized;
                }
                return Err(e);
            }
        };

        let start = start.min(deck.len());
        let batch = materialize(&self.catalog, &deck, start, self.settings.window_size, &excluded).await;

        let (stats, session_id, exhausted) = {
            let mut inner = self.lock_inner();
            if inner.generation != generation {
                self.catalog.unpin_many(&batch.entry_ids());
                return Err(Error::Session("Initialization superseded".to_string()));
            }

            inner.session_id = Uuid::new_v4();
            inner.deck_type = deck_type.clone();
            inner.deck = Arc::clone(&deck);
            inner.position = start;
            inner.resumable = false;
            inner.state = SessionState::Ready;
            self.next.seed(generation, batch);

            let exhausted = self.refresh(&mut inner);
            self.snapshots.save(&self.settings.session_key, &inner.snapshot());
            (self.stats_of(&inner), inner.session_id, exhausted)
        };

        info!(
            %session_id,
            deck_type = %deck_type,
            deck_len = deck.len(),
            position = stats.position,
            "Swipe session initialized"
        );
        self.events.emit_lossy(NamedeckEvent::SessionInitialized {
            session_id,
            deck_type,
            deck_len: deck.len(),
            timestamp: time::now(),
        });
        if exhausted {
            self.emit_exhausted(session_id, deck.len());
        }

        Ok(stats)
    }

    /// Drop both windows and start a new generation
    fn discard_windows(&self, inner: &mut SessionInner) {
        inner.generation += 1;
        let mut released: Vec<u32> = inner.current.drain(..).map(|card| card.entry.id).collect();
        released.extend(self.next.reset(inner.generation).into_iter().map(|card| card.entry.id));
        self.catalog.unpin_many(&released);
    }

    /// Move prepared cards into the current window and keep the next window topped up
    ///
    /// Returns true when this call moved the session to `Exhausted`.
    fn refresh(&self, inner: &mut SessionInner) -> bool {
        if inner.state != SessionState::Ready {
            return false;
        }

        let mut next = self.next.lock();
        if next.generation != inner.generation {
            return false;
        }

        // Slots of cards dropped here, handed to the card after them
        let mut carried = 0usize;
        while inner.current.len() < self.settings.window_size {
            let Some(mut card) = next.cards.pop_front() else {
                break;
            };
            card.skipped_before += carried;
            carried = 0;
            if inner.decisions.is_disliked(card.entry.id) {
                // Disliked after the card was prepared
                self.catalog.unpin(card.entry.id);
                carried = card.skipped_before + 1;
                continue;
            }
            inner.current.push_back(card);
        }
        if carried > 0 {
            match next.cards.front_mut() {
                Some(card) => card.skipped_before += carried,
                None => next.trailing_skipped += carried,
            }
        }

        let deck_len = inner.deck.len();
        if inner.current.is_empty() && next.cards.is_empty() && next.cursor >= deck_len && next.pending == 0 {
            // Trailing slots stay recorded so an undo followed by the last decision
            // consumes them again
            inner.position = (inner.position + next.trailing_skipped).min(deck_len);
            inner.state = SessionState::Exhausted;
            return true;
        }

        if next.cards.len() < self.settings.refill_threshold && next.cursor < deck_len && next.pending == 0 {
            next.pending += 1;
            let request = PreloadRequest {
                generation: inner.generation,
                deck: Arc::clone(&inner.deck),
                want: self.settings.window_size,
                excluded: Arc::new(inner.decisions.disliked_set()),
            };
            if self.preload.submit(request) {
                debug!(generation = inner.generation, cursor = next.cursor, "Submitted preload");
            } else {
                next.pending -= 1;
                warn!("Preload worker unavailable, next window not refilled");
            }
        }

        false
    }

    /// Ready with nothing to show while cards are still on their way
    fn is_loading(&self, inner: &SessionInner) -> bool {
        match inner.state {
            SessionState::Initializing => true,
            SessionState::Ready if inner.current.is_empty() => {
                let next = self.next.lock();
                next.generation == inner.generation && (next.pending > 0 || next.cursor < inner.deck.len())
            }
            _ => false,
        }
    }

    fn stats_of(&self, inner: &SessionInner) -> SessionStats {
        inner.stats(self.is_loading(inner))
    }

    /// Refresh outside of a decision and report a resulting exhaustion
    fn refreshed(&self) -> MutexGuard<'_, SessionInner> {
        let mut inner = self.lock_inner();
        if self.refresh(&mut inner) {
            self.snapshots.save(&self.settings.session_key, &inner.snapshot());
            self.emit_exhausted(inner.session_id, inner.deck.len());
        }
        inner
    }

    // ========================================================================
    // Interaction
    // ========================================================================

    /// Record a decision for the current card, or for `id` if it is in the current window
    ///
    /// No-op (`None`) unless the session is `Ready` with a card to decide. While the next
    /// window is still loading there is no card; `stats().loading` reports that case.
    pub fn decide(&self, direction: SwipeDirection, id: Option<u32>) -> Option<Decision> {
        let (decision, session_id, deck_len) = {
            let mut inner = self.lock_inner();
            self.refresh(&mut inner);

            if inner.state != SessionState::Ready || inner.remaining() == 0 {
                debug!(state = ?inner.state, "Decision ignored, nothing to decide");
                return None;
            }
            if inner.current.is_empty() {
                debug!(
                    loading = self.is_loading(&inner),
                    position = inner.position,
                    "Decision ignored, no card showing while the next window loads"
                );
                return None;
            }

            let index = match id {
                None => 0,
                Some(id) => match inner.current.iter().position(|card| card.entry.id == id) {
                    Some(index) => index,
                    None => {
                        warn!(id, "Decision for a card outside the current window ignored");
                        return None;
                    }
                },
            };
            let PreparedCard { entry, skipped_before } = inner.current.remove(index)?;

            let prior = inner.decisions.membership(entry.id);
            inner.decisions.apply(entry.id, direction);
            let position_before = inner.position;
            inner.undo.push(UndoRecord {
                entry: Arc::clone(&entry),
                skipped_before,
                direction,
                prior,
                position_before,
            });
            inner.position = (position_before + skipped_before + 1).min(inner.deck.len());
            self.catalog.unpin(entry.id);

            let exhausted = self.refresh(&mut inner);
            self.snapshots.save(&self.settings.session_key, &inner.snapshot());

            let decision = Decision {
                entry,
                direction,
                position: inner.position,
                remaining: inner.remaining(),
                exhausted,
            };
            (decision, inner.session_id, inner.deck.len())
        };

        debug!(
            id = decision.entry.id,
            direction = %direction,
            position = decision.position,
            remaining = decision.remaining,
            "Decision recorded"
        );
        self.events.emit_lossy(NamedeckEvent::DecisionRecorded {
            session_id,
            entry_id: decision.entry.id,
            direction,
            position: decision.position,
            remaining: decision.remaining,
            timestamp: time::now(),
        });
        if decision.exhausted {
            self.emit_exhausted(session_id, deck_len);
        }

        Some(decision)
    }

    /// Reverse the most recent decision; `None` when there is nothing to undo
    ///
    /// The card returns to the front of the current window, which may then hold one card
    /// more than the window size.
    pub fn undo(&self) -> Option<Arc<CatalogEntry>> {
        let (entry, session_id, position) = {
            let mut inner = self.lock_inner();
            if !matches!(inner.state, SessionState::Ready | SessionState::Exhausted) {
                return None;
            }
            let record = inner.undo.pop()?;

            inner.decisions.restore(record.entry.id, record.prior);
            self.catalog.pin(record.entry.id);
            inner.current.push_front(PreparedCard {
                entry: Arc::clone(&record.entry),
                skipped_before: record.skipped_before,
            });
            inner.position = record.position_before;
            inner.state = SessionState::Ready;
            self.snapshots.save(&self.settings.session_key, &inner.snapshot());

            (record.entry, inner.session_id, inner.position)
        };

        debug!(id = entry.id, position, "Decision undone");
        self.events.emit_lossy(NamedeckEvent::DecisionUndone {
            session_id,
            entry_id: entry.id,
            position,
            timestamp: time::now(),
        });

        Some(entry)
    }

    /// Move the current card to the back of the current window
    ///
    /// Neutral: decisions and position are untouched and nothing is recorded for undo.
    /// Returns the new current card, or `None` when fewer than two cards are showing.
    pub fn skip(&self) -> Option<Arc<CatalogEntry>> {
        let (skipped, front, session_id) = {
            let mut inner = self.refreshed();
            if inner.state != SessionState::Ready || inner.current.len() < 2 {
                return None;
            }
            let skipped = inner.current.pop_front()?;
            let skipped_id = skipped.entry.id;
            inner.current.push_back(skipped);
            let front = inner.current.front().map(|card| Arc::clone(&card.entry))?;
            (skipped_id, front, inner.session_id)
        };

        self.events.emit_lossy(NamedeckEvent::CardSkipped {
            session_id,
            entry_id: skipped,
            timestamp: time::now(),
        });

        Some(front)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Card awaiting a decision
    ///
    /// `None` when not `Ready`, and briefly while the next window is still loading.
    pub fn current_card(&self) -> Option<Arc<CatalogEntry>> {
        let inner = self.refreshed();
        if inner.state != SessionState::Ready {
            return None;
        }
        inner.current.front().map(|card| Arc::clone(&card.entry))
    }

    /// Up to `n` cards after the current one, as far as they are prepared
    pub fn upcoming(&self, n: usize) -> Vec<Arc<CatalogEntry>> {
        let inner = self.refreshed();
        if inner.state != SessionState::Ready {
            return Vec::new();
        }
        let next = self.next.lock();
        inner
            .current
            .iter()
            .skip(1)
            .chain(next.cards.iter())
            .map(|card| Arc::clone(&card.entry))
            .take(n)
            .collect()
    }


    pub fn stats(&self) -> SessionStats {
        let inner = self.refreshed();
        self.stats_of(&inner)
    }

    /// Wait until no preload is outstanding
    pub async fn settled(&self) {
        self.next.settled().await;
        // Promote what just arrived
        drop(self.refreshed());
    }

    // ========================================================================
    // Liked entries
    // ========================================================================

    pub async fn liked_entries(&self) -> Vec<Arc<CatalogEntry>> {
        let ids = self.lock_inner().decisions.liked().to_vec();
        self.catalog.resolve_many(&ids).await
    }

    pub async fn super_liked_entries(&self) -> Vec<Arc<CatalogEntry>> {
        let ids = self.lock_inner().decisions.super_liked().to_vec();
        self.catalog.resolve_many(&ids).await
    }

    pub fn export_liked(&self) -> LikedExport {
        let inner = self.lock_inner();
        LikedExport {
            liked: inner.decisions.liked().to_vec(),
            super_liked: inner.decisions.super_liked().to_vec(),
            export_date: time::now(),
            total_swiped: inner.decisions.liked().len() + inner.decisions.disliked().len(),
        }
    }

    /// Replace liked and super-liked ids from an export document
    ///
    /// Imported ids leave the disliked set. Undo history is cleared. Returns the number
    /// of liked ids after the import.
    pub fn import_liked(&self, json: &str) -> Result<usize> {
        let export: LikedExport = serde_json::from_str(json)
            .map_err(|e| Error::BadRequest(format!("Invalid liked export: {}", e)))?;

        let count = {
            let mut inner = self.lock_inner();
            let count = inner.decisions.replace_liked(&export.liked, &export.super_liked);
            inner.undo.clear();
            self.snapshots.save(&self.settings.session_key, &inner.snapshot());
            count
        };

        info!(liked = count, super_liked = export.super_liked.len(), "Imported liked names");
        Ok(count)
    }

    fn emit_exhausted(&self, session_id: Uuid, deck_len: usize) {
        info!(%session_id, deck_len, "Swipe deck exhausted");
        self.events.emit_lossy(NamedeckEvent::SessionExhausted {
            session_id,
            deck_len,
            timestamp: time::now(),
        });
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionInner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::CatalogOptions;
    use crate::catalog::source::{MemorySource, Resource};
    use crate::db::MemorySnapshotStore;

    fn source_with(deck: &[u32], core: std::ops::Range<u32>) -> Arc<MemorySource> {
        let names: Vec<_> = core
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
        source.insert(
            Resource::Decks,
            serde_json::to_vec(&serde_json::json!({"quick": deck, "male": [3, 1]})).unwrap(),
        );
        source
    }

    fn settings(window_size: usize) -> SwipeSettings {
        SwipeSettings {
            window_size,
            refill_threshold: window_size,
            undo_depth: 10,
            session_key: "test".to_string(),
        }
    }

    async fn open(source: Arc<MemorySource>, store: Arc<MemorySnapshotStore>, window: usize) -> SwipeSession {
        let events = Arc::new(EventBus::new(64));
        let catalog = Arc::new(TieredCatalog::new(
            source.clone(),
            CatalogOptions::default(),
            Arc::clone(&events),
        ));
        let decks = Arc::new(DeckStore::new(source));
        SwipeSession::open(catalog, decks, store, settings(window), events)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_shows_first_card() {
        let session = open(source_with(&[1, 2, 3, 4, 5], 0..10), Arc::new(MemorySnapshotStore::new()), 2).await;
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.current_card().is_none());

        let stats = session.initialize(DeckType::Quick).await.unwrap();

        assert_eq!(stats.state, SessionState::Ready);
        assert_eq!(stats.deck_len, 5);
        assert_eq!(session.current_card().map(|e| e.id), Some(1));
    }

    #[tokio::test]
    async fn test_decide_specific_card_in_window() {
        let session = open(source_with(&[1, 2, 3], 0..10), Arc::new(MemorySnapshotStore::new()), 3).await;
        session.initialize(DeckType::Quick).await.unwrap();

        let decision = session.decide(SwipeDirection::Superlike, Some(2)).unwrap();
        assert_eq!(decision.entry.id, 2);
        assert_eq!(session.current_card().map(|e| e.id), Some(1));

        // Not in the window
        assert!(session.decide(SwipeDirection::Like, Some(9)).is_none());

        let stats = session.stats();
        assert_eq!(stats.liked, 1);
        assert_eq!(stats.super_liked, 1);
        assert_eq!(stats.position, 1);
    }

    #[tokio::test]
    async fn test_skip_rotates_without_recording() {
        let store = Arc::new(MemorySnapshotStore::new());
        let session = open(source_with(&[1, 2, 3], 0..10), Arc::clone(&store), 3).await;
        session.initialize(DeckType::Quick).await.unwrap();
        let saves = store.save_count();

        assert_eq!(session.skip().map(|e| e.id), Some(2));
        assert_eq!(session.upcoming(5).iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 1]);

        let stats = session.stats();
        assert_eq!(stats.position, 0);
        assert_eq!(stats.undo_available, 0);
        assert_eq!(store.save_count(), saves);
    }

    #[tokio::test]
    async fn test_skip_single_card_is_noop() {
        let session = open(source_with(&[1], 0..10), Arc::new(MemorySnapshotStore::new()), 2).await;
        session.initialize(DeckType::Quick).await.unwrap();

        assert!(session.skip().is_none());
        assert_eq!(session.current_card().map(|e| e.id), Some(1));
    }

    #[tokio::test]
    async fn test_undo_from_exhausted() {
        let session = open(source_with(&[1, 2], 0..10), Arc::new(MemorySnapshotStore::new()), 2).await;
        session.initialize(DeckType::Quick).await.unwrap();

        session.decide(SwipeDirection::Like, None).unwrap();
        let last = session.decide(SwipeDirection::Dislike, None).unwrap();
        assert!(last.exhausted);
        assert_eq!(session.state(), SessionState::Exhausted);

        assert_eq!(session.undo().map(|e| e.id), Some(2));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.current_card().map(|e| e.id), Some(2));
        assert_eq!(session.stats().remaining, 1);
        assert_eq!(session.stats().disliked, 0);
    }

    fn with_dislikes(disliked: &[u32]) -> Arc<MemorySnapshotStore> {
        Arc::new(MemorySnapshotStore::with_snapshot(
            "test",
            SessionSnapshot {
                liked_ids: vec![],
                disliked_ids: disliked.to_vec(),
                super_liked_ids: vec![],
                position: 0,
                deck_type: DeckType::Quick,
            },
        ))
    }

    #[tokio::test]
    async fn test_undo_restores_position_past_passed_slots() {
        let session = open(source_with(&[1, 2, 3, 4, 5], 0..10), with_dislikes(&[3]), 2).await;
        session.initialize(DeckType::Quick).await.unwrap();
        session.settled().await;

        session.decide(SwipeDirection::Like, None).unwrap();
        assert_eq!(session.undo().map(|e| e.id), Some(1));

        let stats = session.stats();
        assert_eq!(stats.position, 0);
        assert_eq!(stats.remaining, 5);

        let mut positions = Vec::new();
        while let Some(decision) = session.decide(SwipeDirection::Like, None) {
            positions.push((decision.entry.id, decision.position));
            session.settled().await;
        }
        assert_eq!(positions, vec![(1, 1), (2, 2), (4, 4), (5, 5)]);
        assert_eq!(session.state(), SessionState::Exhausted);
    }

    #[tokio::test]
    async fn test_undo_at_end_consumes_trailing_slots_again() {
        let session = open(source_with(&[1, 2, 3], 0..10), with_dislikes(&[3]), 2).await;
        session.initialize(DeckType::Quick).await.unwrap();
        session.settled().await;

        session.decide(SwipeDirection::Like, None).unwrap();
        let last = session.decide(SwipeDirection::Like, None).unwrap();
        assert!(last.exhausted);
        assert_eq!(last.position, 3);

        session.undo().unwrap();
        assert_eq!(session.stats().position, 1);

        let again = session.decide(SwipeDirection::Dislike, None).unwrap();
        assert!(again.exhausted);
        assert_eq!(again.position, 3);
    }

    #[tokio::test]
    async fn test_decide_while_next_window_loads_is_ignored_and_reported() {
        let session = open(source_with(&[1, 2, 3], 0..10), Arc::new(MemorySnapshotStore::new()), 1).await;
        session.initialize(DeckType::Quick).await.unwrap();

        // The preload for card 2 has been submitted but not run yet
        session.decide(SwipeDirection::Like, None).unwrap();
        assert!(session.decide(SwipeDirection::Like, None).is_none());

        let stats = session.stats();
        assert!(stats.loading);
        assert_eq!(stats.state, SessionState::Ready);
        assert_eq!(stats.liked, 1);
        assert_eq!(stats.position, 1);

        session.settled().await;
        assert_eq!(session.current_card().map(|e| e.id), Some(2));
        assert!(!session.stats().loading);
    }

    #[tokio::test]
    async fn test_undo_with_empty_history() {
        let session = open(source_with(&[1, 2], 0..10), Arc::new(MemorySnapshotStore::new()), 2).await;
        assert!(session.undo().is_none());
        session.initialize(DeckType::Quick).await.unwrap();
        assert!(session.undo().is_none());
    }

    #[tokio::test]
    async fn test_empty_deck_is_exhausted() {
        let session = open(source_with(&[], 0..10), Arc::new(MemorySnapshotStore::new()), 2).await;

        let stats = session.initialize(DeckType::Quick).await.unwrap();

        assert_eq!(stats.state, SessionState::Exhausted);
        assert_eq!(stats.remaining, 0);
        assert_eq!(stats.percent_complete, 0.0);
        assert!(session.decide(SwipeDirection::Like, None).is_none());
    }

    #[tokio::test]
    async fn test_missing_deck_leaves_session_uninitialized() {
        let session = open(source_with(&[1], 0..10), Arc::new(MemorySnapshotStore::new()), 2).await;

        let result = session.initialize(DeckType::Category("space".into())).await;

        assert!(matches!(result, Err(Error::Deck(_))));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_reset_restarts_active_deck() {
        let store = Arc::new(MemorySnapshotStore::new());
        let session = open(source_with(&[1, 2, 3], 0..10), Arc::clone(&store), 3).await;
        session.initialize(DeckType::Male).await.unwrap();
        session.decide(SwipeDirection::Dislike, None).unwrap();

        let stats = session.reset().await.unwrap();

        assert_eq!(stats.state, SessionState::Ready);
        assert_eq!(stats.disliked, 0);
        assert_eq!(stats.position, 0);
        assert_eq!(session.current_card().map(|e| e.id), Some(3));
        let saved = store.get("test").unwrap();
        assert!(saved.disliked_ids.is_empty());
        assert_eq!(saved.deck_type, DeckType::Male);
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let session = open(source_with(&[1, 2, 3], 0..10), Arc::new(MemorySnapshotStore::new()), 3).await;
        session.initialize(DeckType::Quick).await.unwrap();
        session.decide(SwipeDirection::Like, None).unwrap();
        session.decide(SwipeDirection::Superlike, None).unwrap();
        session.decide(SwipeDirection::Dislike, None).unwrap();

        let export = session.export_liked();
        assert_eq!(export.liked, vec![1, 2]);
        assert_eq!(export.super_liked, vec![2]);
        assert_eq!(export.total_swiped, 3);

        let count = session
            .import_liked(r#"{"liked":[3],"superLiked":[],"exportDate":"2025-01-01T00:00:00Z","totalSwiped":1}"#)
            .unwrap();
        assert_eq!(count, 1);
        let stats = session.stats();
        assert_eq!(stats.liked, 1);
        assert_eq!(stats.disliked, 0);
        assert_eq!(stats.undo_available, 0);

        assert!(matches!(session.import_liked("not json"), Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_liked_entries_resolve_in_order() {
        let session = open(source_with(&[4, 2, 6], 0..10), Arc::new(MemorySnapshotStore::new()), 3).await;
        session.initialize(DeckType::Quick).await.unwrap();
        session.decide(SwipeDirection::Like, None).unwrap();
        session.decide(SwipeDirection::Superlike, None).unwrap();

        let liked: Vec<u32> = session.liked_entries().await.iter().map(|e| e.id).collect();
        let super_liked: Vec<u32> = session.super_liked_entries().await.iter().map(|e| e.id).collect();

        assert_eq!(liked, vec![4, 2]);
        assert_eq!(super_liked, vec![2]);
    }

    #[tokio::test]
    async fn test_decided_cards_are_unpinned() {
        let source = source_with(&[1, 2], 0..10);
        let events = Arc::new(EventBus::new(16));
        let catalog = Arc::new(TieredCatalog::new(
            source.clone(),
            CatalogOptions::default(),
            Arc::clone(&events),
        ));
        let session = SwipeSession::open(
            Arc::clone(&catalog),
            Arc::new(DeckStore::new(source)),
            Arc::new(MemorySnapshotStore::new()),
            settings(2),
            events,
        )
        .await
        .unwrap();
        session.initialize(DeckType::Quick).await.unwrap();
        assert!(catalog.is_pinned(1));

        session.decide(SwipeDirection::Like, None).unwrap();

        assert!(!catalog.is_pinned(1));
        assert!(catalog.is_pinned(2));
    }
}
