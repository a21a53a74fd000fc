//! Bounded key→task cache with LRU eviction and TTL expiry.
//!
//! The pipeline keeps one live throttle task per content block. Conversations
//! can produce many short-lived blocks, so the registry holding those tasks
//! must be bounded in both count and age. This crate provides:
//! - LRU eviction when the resident count exceeds a maximum
//! - idle expiry after a TTL, with access refreshing an entry's age
//! - an eviction hook so the owner can cancel a task that falls out
//!
//! # Example
//!
//! ```rust,ignore
//! use taliesin_cache::{CacheConfig, UpdateCache};
//!
//! let cache: UpdateCache<MyTask> = UpdateCache::new(
//!     CacheConfig::new().with_max_entries(100),
//! );
//! ```

mod cache;
mod config;
mod ttl;

pub use cache::{CacheStats, DropEvicted, EvictionHandler, UpdateCache};
pub use config::CacheConfig;
pub use ttl::TtlTracker;
