//! 网络请求优化模块：按键合并并发请求，并对失败请求进行重试。
//!
//! # Request De-duplication
//!
//! [`RequestDeduplicator`] guarantees at most one in-flight request per
//! logical key. Concurrent callers asking for the same key share a single
//! underlying call and observe the same settlement; once the call settles
//! (after any retries) the key is free again.
//!
//! ```rust
//! use async_ops::network::{RequestDeduplicator, RequestOptions};
//! use async_ops::resilience::RetryExecutor;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let dedup = RequestDeduplicator::new(Arc::new(RetryExecutor::default()));
//! let listings: Result<Vec<String>, String> = dedup
//!     .request("listings:page=1", || async { Ok(vec!["loft".to_string()]) }, RequestOptions::default())
//!     .await;
//! # }
//! ```
//!
//! Passing `RequestOptions::new().with_cache(false)` opts out of sharing:
//! every call then starts its own attempt.

mod deduplicator;

pub use deduplicator::{RequestDeduplicator, RequestOptions, DEFAULT_MAX_RETRIES};
