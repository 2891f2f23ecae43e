//! Bounded undo stack
//!
//! Holds the most recent decisions, newest last. Pushing past the depth drops the
//! oldest record.

use crate::session::decisions::Membership;
use namedeck_common::{CatalogEntry, SwipeDirection};
use std::collections::VecDeque;
use std::sync::Arc;

/// One reversible decision
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub entry: Arc<CatalogEntry>,
    /// Deck slots passed over just before the card, consumed with it
    pub skipped_before: usize,
    pub direction: SwipeDirection,
    /// Membership of the id in each decision set before the decision
    pub prior: Membership,
    pub position_before: usize,
}

#[derive(Debug)]
pub struct UndoStack {
    records: VecDeque<UndoRecord>,
    depth: usize,
}

impl UndoStack {
    pub fn new(depth: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(depth),
            depth: depth.max(1),
        }
    }

    /// Push a record, returning the oldest one if it fell off
    pub fn push(&mut self, record: UndoRecord) -> Option<UndoRecord> {
        let dropped = if self.records.len() >= self.depth {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        dropped
    }

    pub fn pop(&mut self) -> Option<UndoRecord> {
        self.records.pop_back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
