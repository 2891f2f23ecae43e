//! Event types for the namedeck event system
//!
//! Provides the shared event enum and the broadcast `EventBus` used by the catalog
//! loader, the search index and swipe sessions.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{DeckType, SwipeDirection};

/// namedeck event types
///
/// Events are broadcast via `EventBus` and serialized as-is for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NamedeckEvent {
    /// A chunk was fetched, parsed and installed into the resident cache
    ChunkLoaded {
        chunk: String,
        /// Entries carried by the chunk file
        entries: usize,
        /// Resident entry count after installation
        resident: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A chunk fetch or parse failed; the chunk stays unloaded and may be retried
    ChunkLoadFailed {
        chunk: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Search index manifest loaded
    SearchIndexLoaded {
        /// Number of exact-name lookup keys
        names: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Search index manifest failed to load; searches fall back to resident entries
    SearchIndexDegraded {
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A swipe session materialized its first window
    SessionInitialized {
        session_id: Uuid,
        deck_type: DeckType,
        deck_len: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A like / dislike / superlike was recorded
    DecisionRecorded {
        session_id: Uuid,
        entry_id: u32,
        direction: SwipeDirection,
        position: usize,
        remaining: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The most recent decision was reversed
    DecisionUndone {
        session_id: Uuid,
        entry_id: u32,
        position: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current card was moved to the back of the window without a decision
    CardSkipped {
        session_id: Uuid,
        entry_id: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every card of the deck has been decided
    SessionExhausted {
        session_id: Uuid,
        deck_len: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Decision sets and position were cleared
    SessionReset {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl NamedeckEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            NamedeckEvent::ChunkLoaded { .. } => "ChunkLoaded",
            NamedeckEvent::ChunkLoadFailed { .. } => "ChunkLoadFailed",
            NamedeckEvent::SearchIndexLoaded { .. } => "SearchIndexLoaded",
            NamedeckEvent::SearchIndexDegraded { .. } => "SearchIndexDegraded",
            NamedeckEvent::SessionInitialized { .. } => "SessionInitialized",
            NamedeckEvent::DecisionRecorded { .. } => "DecisionRecorded",
            NamedeckEvent::DecisionUndone { .. } => "DecisionUndone",
            NamedeckEvent::CardSkipped { .. } => "CardSkipped",
            NamedeckEvent::SessionExhausted { .. } => "SessionExhausted",
            NamedeckEvent::SessionReset { .. } => "SessionReset",
        }
    }
}

/// Broadcast bus for `NamedeckEvent`
///
/// Cheap to share behind an `Arc`; emitting never blocks. Slow subscribers lag and
/// lose the oldest events rather than holding up the catalog.
pub struct EventBus {
    tx: broadcast::Sender<NamedeckEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use namedeck_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<NamedeckEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NamedeckEvent,
    ) -> Result<usize, broadcast::error::SendError<NamedeckEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NamedeckEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
