//! 弹性模式模块：提供重试与退避策略。
//!
//! # Retry and Backoff
//!
//! This module provides the retry primitives shared by the operation runner
//! and the request de-duplicator.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Backoff`] | Linear or exponential delay schedule with a cap |
//! | [`RetryContext`] | Per-operation retry budget and exponential delay |
//! | [`RetryExecutor`] | Keyed retry loop used for network requests |
//!
//! ## Backoff
//!
//! ```rust
//! use async_ops::resilience::RetryContext;
//! use std::time::Duration;
//!
//! let mut ctx = RetryContext::new(3, Duration::from_millis(100)).with_multiplier(2.0);
//! assert_eq!(ctx.begin_retry(), Some(Duration::from_millis(100)));
//! assert_eq!(ctx.begin_retry(), Some(Duration::from_millis(200)));
//! assert_eq!(ctx.begin_retry(), Some(Duration::from_millis(400)));
//! assert_eq!(ctx.begin_retry(), None);
//! ```
//!
//! ## Keyed retries
//!
//! ```rust
//! use async_ops::resilience::{Backoff, RetryExecutor};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let executor = RetryExecutor::new(Backoff::linear(Duration::from_millis(500)));
//! let result: Result<u32, String> = executor
//!     .execute_with_retry("listing:42", || async { Ok(42) }, 3)
//!     .await;
//! assert_eq!(result, Ok(42));
//! # }
//! ```

pub mod backoff;
pub mod retry;

pub use backoff::{Backoff, RetryContext, DEFAULT_MAX_DELAY};
pub use retry::{RetryExecutor, DEFAULT_RETRY_DELAY};
