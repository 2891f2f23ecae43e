//! Session state and progress statistics

use serde::Serialize;

/// Lifecycle of a swipe session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Exhausted,
}

/// Progress derived purely from session state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    pub deck_type: String,
    pub liked: usize,
    pub disliked: usize,
    pub super_liked: usize,
    /// Liked plus disliked
    pub total_swiped: usize,
    pub position: usize,
    pub deck_len: usize,
    pub remaining: usize,
    pub percent_complete: f64,
    pub undo_available: usize,
    /// No card is showing yet but more are being prepared; decisions are ignored until
    /// one arrives
    pub loading: bool,
}

/// Counts that feed `SessionStats`
pub struct StatsInput<'a> {
    pub state: SessionState,
    pub deck_type: &'a str,
    pub liked: usize,
    pub disliked: usize,
    pub super_liked: usize,
    pub position: usize,
    pub deck_len: usize,
    pub undo_available: usize,
    pub loading: bool,
}

impl SessionStats {
    pub fn compute(input: StatsInput<'_>) -> Self {
        let remaining = input.deck_len.saturating_sub(input.position);
        let percent_complete = if input.deck_len == 0 {
            0.0
        } else {
            (input.position.min(input.deck_len) as f64 / input.deck_len as f64) * 100.0
        };

        Self {
            state: input.state,
            deck_type: input.deck_type.to_string(),
            liked: input.liked,
            disliked: input.disliked,
            super_liked: input.super_liked,
            total_swiped: input.liked + input.disliked,
            position: input.position,
            deck_len: input.deck_len,
            remaining,
            percent_complete,
            undo_available: input.undo_available,
            loading: input.loading,
        }
    }
}
