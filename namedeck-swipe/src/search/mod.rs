pub mod index;

pub use index::{BucketKind, SearchIndex};
