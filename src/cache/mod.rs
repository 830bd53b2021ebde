//! 内存缓存模块：提供容量受限、按最近最少使用策略淘汰的缓存。
//!
//! # Bounded In-Memory Cache
//!
//! [`BoundedCache`] is a fixed-capacity key/value store with
//! least-recently-used eviction. Reads promote an entry to most recently
//! used; inserting past capacity evicts the least recently used entry.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BoundedCache`] | Thread-safe LRU cache shared through `Arc` |
//! | [`CacheStats`] | Hit, miss, set, delete and eviction counters |
//!
//! ## Example
//!
//! ```rust
//! use async_ops::cache::BoundedCache;
//!
//! let cache: BoundedCache<String, u32> = BoundedCache::new(2).unwrap();
//! cache.set("a".into(), 1);
//! cache.set("b".into(), 2);
//! cache.get("a");
//! cache.set("c".into(), 3);
//!
//! assert!(!cache.has("b"));
//! assert!(cache.has("a") && cache.has("c"));
//! ```

mod bounded;
mod stats;

pub use bounded::{BoundedCache, DEFAULT_CAPACITY};
pub use stats::CacheStats;
