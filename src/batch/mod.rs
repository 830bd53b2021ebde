//! 批处理模块：合并零散的提交，并按顺序或并发运行操作队列。
//!
//! # Batching and Queued Execution
//!
//! This module provides two independent utilities:
//!
//! - [`BatchProcessor`] coalesces many `add(item)` calls into fewer processor
//!   calls, bounding both batch size and the time an item may wait.
//! - [`SequentialRunner`] and [`ParallelRunner`] run a queue of async
//!   operations and report a per-position [`QueueOutcome`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchProcessor`] | Size/interval-triggered flushing to a processor function |
//! | [`BatchConfig`] | Batch size and flush interval |
//! | [`BatchStats`] | Flush, item and failure counters |
//! | [`SequentialRunner`] | One operation at a time, no short-circuit on failure |
//! | [`ParallelRunner`] | All operations at once, all-settled join |
//!
//! ## Example
//!
//! ```rust
//! use async_ops::batch::{BatchConfig, BatchProcessor};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let config = BatchConfig::new()
//!     .with_batch_size(3)
//!     .with_flush_interval(Duration::from_millis(50));
//! let views = BatchProcessor::new(config, |ids: Vec<u64>| async move {
//!     println!("recording {} views", ids.len());
//!     Ok::<(), String>(())
//! });
//!
//! views.add(1).await;
//! views.add(2).await;
//! views.add(3).await; // delivers [1, 2, 3]
//! # }
//! ```
//!
//! ## Queue strategies
//!
//! - **Sequential**: operation *i + 1* starts only after operation *i* settled
//! - **Parallel**: every operation starts immediately; results keep queue order

mod processor;
mod queue;

pub use processor::{
    BatchConfig, BatchError, BatchProcessor, BatchStats, DEFAULT_BATCH_SIZE,
    DEFAULT_FLUSH_INTERVAL,
};
pub use queue::{ParallelRunner, QueueOutcome, QueueProgress, SequentialRunner};
