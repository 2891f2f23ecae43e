//! Swipe session
//!
//! Deck walking with like / dislike / superlike decisions, bounded undo and a preloaded
//! next window.

pub mod decisions;
pub mod engine;
pub mod preload;
pub mod stats;
pub mod undo;
pub mod window;

pub use engine::{Decision, LikedExport, SwipeSession};
pub use stats::{SessionState, SessionStats};
