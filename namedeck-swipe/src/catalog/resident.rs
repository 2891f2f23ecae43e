//! Bounded resident entry cache
//!
//! Insertion-ordered (FIFO) eviction, one entry out per entry in once the bound is
//! reached. Pinned ids are never evicted; a pin may be taken before the entry is
//! resident so that the load bringing it in cannot push it straight back out.

use namedeck_common::CatalogEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// How an insertion treats the residency bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Evict oldest unpinned entries to stay at the bound
    Bounded,
    /// Ignore the bound for this insertion
    Expand,
}

pub struct ResidentCache {
    entries: HashMap<u32, Arc<CatalogEntry>>,
    order: VecDeque<u32>,
    pins: HashMap<u32, usize>,
    limit: usize,
}

impl ResidentCache {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            pins: HashMap::new(),
            limit: limit.max(1),
        }
    }

    pub fn get(&self, id: u32) -> Option<Arc<CatalogEntry>> {
        self.entries.get(&id).cloned()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Insert entries, returning the ids evicted to make room
    ///
    /// Re-inserting a resident id replaces its value without changing its age.
    pub fn insert_all<I>(&mut self, entries: I, mode: InsertMode) -> Vec<u32>
    where
        I: IntoIterator<Item = Arc<CatalogEntry>>,
    {
        let mut evicted = Vec::new();

        for entry in entries {
            let id = entry.id;
            if self.entries.insert(id, entry).is_some() {
                continue;
            }

            if mode == InsertMode::Bounded && self.entries.len() > self.limit {
                if let Some(victim) = self.evict_oldest_unpinned() {
                    evicted.push(victim);
                }
            }
            self.order.push_back(id);
        }

        evicted
    }

    fn evict_oldest_unpinned(&mut self) -> Option<u32> {
        let idx = self.order.iter().position(|id| !self.pins.contains_key(id))?;
        let victim = self.order.remove(idx)?;
        self.entries.remove(&victim);
        Some(victim)
    }

    /// Keep only entries matching `keep` (pinned entries always stay); returns removed ids
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<u32>
    where
        F: FnMut(u32) -> bool,
    {
        let mut removed = Vec::new();
        let pins = &self.pins;
        self.order.retain(|&id| {
            if pins.contains_key(&id) || keep(id) {
                true
            } else {
                removed.push(id);
                false
            }
        });
        for id in &removed {
            self.entries.remove(id);
        }
        removed
    }

    pub fn pin(&mut self, id: u32) {
        *self.pins.entry(id).or_insert(0) += 1;
    }

    pub fn unpin(&mut self, id: u32) {
        if let Some(count) = self.pins.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&id);
            }
        }
    }

    pub fn is_pinned(&self, id: u32) -> bool {
        self.pins.contains_key(&id)
    }

    /// Number of distinct pinned ids
    pub fn pinned_count(&self) -> usize {
        self.pins.len()
    }

    /// Resident entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CatalogEntry>> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}
