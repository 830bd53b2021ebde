//! # async-ops
//!
//! 异步操作与加载状态管理库：超时、重试退避、请求去重、有界缓存与批处理。
//!
//! Loading-state management and performance utilities for async Rust
//! applications: tracked operations with timeouts and backoff retries,
//! per-key request de-duplication, a bounded LRU cache, batching and queued
//! execution.
//!
//! ## Overview
//!
//! Application code constructs an [`AsyncOperation`] (directly or from a
//! [`Context`] preset) and hands it an async function. The runner races the
//! function against its deadline, records the outcome in an observable
//! [`OperationState`], and lets the caller retry with exponential backoff.
//! Network-style calls go through [`RequestDeduplicator`], which shares one
//! in-flight call among all callers asking for the same key and retries it
//! with a linear backoff.
//!
//! ## Key Features
//!
//! - **Observable state**: `state()` snapshots plus `subscribe(callback)`
//! - **Timeouts**: the deadline wins over a slower function
//! - **Retries**: bounded, with exponential (runner) or linear (network) backoff
//! - **De-duplication**: at most one in-flight request per key
//! - **Caching**: [`cache::BoundedCache`] with least-recently-used eviction
//! - **Batching**: [`batch::BatchProcessor`] flushes by size or interval
//! - **Injectable time**: every timer goes through [`clock::Clock`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_ops::{Context, OperationPreset, RuntimeConfig};
//!
//! #[tokio::main]
//! async fn main() -> async_ops::Result<()> {
//!     let ctx = Context::from_config(RuntimeConfig::from_env()?)?;
//!
//!     let op = ctx.operation::<Vec<String>, String>(OperationPreset::Api);
//!     op.subscribe(|state| println!("loading = {}", state.is_loading));
//!
//!     match op.execute(|| async { Ok(vec!["loft".to_string()]) }).await {
//!         Ok(listings) => println!("{} listings", listings.len()),
//!         Err(e) if op.can_retry() => {
//!             eprintln!("{}; retrying", e);
//!             let _ = op.retry().await;
//!         }
//!         Err(e) => eprintln!("{}", e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`operation`] | Async operation runner, options, presets, global loader |
//! | [`resilience`] | Backoff schedules and the keyed retry executor |
//! | [`network`] | Per-key request de-duplication |
//! | [`cache`] | Bounded LRU cache |
//! | [`batch`] | Batch processor, sequential and parallel queue runners |
//! | [`telemetry`] | Failure reporting sinks and policy |
//! | [`clock`] | Injectable time source |
//! | [`config`] | Runtime configuration loading and validation |
//! | [`context`] | Explicitly constructed shared components |

pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod network;
pub mod operation;
pub mod resilience;
pub mod telemetry;

// Re-export main types for convenience
pub use config::RuntimeConfig;
pub use context::{Context, ContextBuilder};
pub use network::{RequestDeduplicator, RequestOptions};
pub use operation::{AsyncOperation, OperationOptions, OperationPreset, OperationState};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, OperationError};
