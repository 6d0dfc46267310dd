//! Aggregation of a post and its full reply tree.
//!
//! The content API only lists direct replies, so [`TreeBuilder`] expands the
//! tree level by level, enriching each level's authors with avatars through
//! one batched lookup per level. [`AggregateStore`] holds the result for a UI,
//! tracks root and tree loading independently, and applies optimistic local
//! patches with structural sharing.

pub mod avatar;
pub mod fetcher;
pub mod profile_cache;
pub mod store;
pub mod tree;

pub use avatar::{extract_avatar, AvatarBatchResolver};
pub use fetcher::{ChildFetcher, RootFetcher};
pub use profile_cache::{CacheLookup, ProfileCache};
pub use store::{AggregateState, AggregateStore, LoadPhase, StoreOptions};
pub use tree::{find_node, node_count, sort_newest_first, walk, TreeBuilder};
