pub mod store;

pub use store::DeckStore;
