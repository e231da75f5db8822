mod atomic;
mod store;
mod types;

pub(crate) use store::iso8601;
pub use store::{guid_for, FeedStore, ALL_KEYWORD};
pub use types::{FileEntry, StoreError};
