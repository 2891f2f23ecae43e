//! Decision sets
//!
//! Liked, disliked and super-liked ids in decision order. Super-liked is a subset of
//! liked; liked and disliked are disjoint.

use namedeck_common::model::SessionSnapshot;
use namedeck_common::SwipeDirection;
use std::collections::HashSet;

/// Where an id sat in each set before a decision, for exact undo
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Membership {
    pub liked: Option<usize>,
    pub disliked: Option<usize>,
    pub super_liked: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decisions {
    liked: Vec<u32>,
    disliked: Vec<u32>,
    super_liked: Vec<u32>,
}

fn dedup(ids: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn remove(list: &mut Vec<u32>, id: u32) {
    list.retain(|v| *v != id);
}

fn add(list: &mut Vec<u32>, id: u32) {
    if !list.contains(&id) {
        list.push(id);
    }
}

fn restore(list: &mut Vec<u32>, id: u32, prior: Option<usize>) {
    match prior {
        None => remove(list, id),
        Some(index) => {
            if !list.contains(&id) {
                let index = index.min(list.len());
                list.insert(index, id);
            }
        }
    }
}

impl Decisions {
    /// Sets from a persisted snapshot, repaired to hold the set invariants
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let mut liked = dedup(&snapshot.liked_ids);
        let super_liked = dedup(&snapshot.super_liked_ids);
        for id in &super_liked {
            add(&mut liked, *id);
        }
        let liked_set: HashSet<u32> = liked.iter().copied().collect();
        let disliked = dedup(&snapshot.disliked_ids)
            .into_iter()
            .filter(|id| !liked_set.contains(id))
            .collect();

        Self {
            liked,
            disliked,
            super_liked,
        }
    }

    pub fn liked(&self) -> &[u32] {
        &self.liked
    }

    pub fn disliked(&self) -> &[u32] {
        &self.disliked
    }

    pub fn super_liked(&self) -> &[u32] {
        &self.super_liked
    }

    pub fn is_disliked(&self, id: u32) -> bool {
        self.disliked.contains(&id)
    }

    pub fn disliked_set(&self) -> HashSet<u32> {
        self.disliked.iter().copied().collect()
    }

    pub fn membership(&self, id: u32) -> Membership {
        Membership {
            liked: self.liked.iter().position(|v| *v == id),
            disliked: self.disliked.iter().position(|v| *v == id),
            super_liked: self.super_liked.iter().position(|v| *v == id),
        }
    }

    /// Record a decision; the id leaves the opposing set
    pub fn apply(&mut self, id: u32, direction: SwipeDirection) {
        match direction {
            SwipeDirection::Like => {
                add(&mut self.liked, id);
                remove(&mut self.disliked, id);
            }
            SwipeDirection::Superlike => {
                add(&mut self.liked, id);
                add(&mut self.super_liked, id);
                remove(&mut self.disliked, id);
            }
            SwipeDirection::Dislike => {
                add(&mut self.disliked, id);
                remove(&mut self.liked, id);
                remove(&mut self.super_liked, id);
            }
        }
    }

    /// Put an id back exactly where it was before the matching `apply`
    pub fn restore(&mut self, id: u32, prior: Membership) {
        restore(&mut self.liked, id, prior.liked);
        restore(&mut self.disliked, id, prior.disliked);
        restore(&mut self.super_liked, id, prior.super_liked);
    }

    /// Replace liked and super-liked sets (import); returns the liked count
    pub fn replace_liked(&mut self, liked: &[u32], super_liked: &[u32]) -> usize {
        self.liked = dedup(liked);
        self.super_liked = dedup(super_liked);
        for id in self.super_liked.clone() {
            add(&mut self.liked, id);
        }
        let liked_set: HashSet<u32> = self.liked.iter().copied().collect();
        self.disliked.retain(|id| !liked_set.contains(id));
        self.liked.len()
    }

    pub fn clear(&mut self) {
        self.liked.clear();
        self.disliked.clear();
        self.super_liked.clear();
    }
}
