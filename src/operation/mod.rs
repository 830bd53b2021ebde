//! 异步操作模块：追踪单个异步操作的加载状态、超时与重试。
//!
//! # Async Operations
//!
//! [`AsyncOperation`] wraps one async function and keeps an observable
//! [`OperationState`] describing it: whether it is loading, its last result or
//! error, how long it took and whether it timed out.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AsyncOperation`] | Runner with timeout, cancel, reset and backoff retry |
//! | [`OperationOptions`] | Timeout, retry budget and loader settings |
//! | [`OperationPreset`] | Named option sets (`quick`, `api`, `upload`, `background`) |
//! | [`GlobalLoader`] | Shared "anything loading" indicator |
//! | [`StateStore`] | Observable value with subscribe / get_state |
//!
//! ## Example
//!
//! ```rust
//! use async_ops::operation::{AsyncOperation, OperationPreset};
//!
//! # async fn demo() {
//! let op: AsyncOperation<u32, String> = AsyncOperation::new(OperationPreset::Api.into());
//! op.subscribe(|state| println!("loading: {}", state.is_loading));
//!
//! if op.execute(|| async { Err("offline".to_string()) }).await.is_err() && op.can_retry() {
//!     let _ = op.retry().await;
//! }
//! # }
//! ```

mod global;
mod options;
mod runner;
mod state;

pub use global::GlobalLoader;
pub use options::{OperationOptions, OperationPreset};
pub use runner::AsyncOperation;
pub use state::{OperationState, StateStore, Subscribers, SubscriptionId};
