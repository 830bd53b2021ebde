//! Shared runtime context.
//!
//! A [`Context`] owns the components that are meant to be shared by a whole
//! application: the response cache, the request de-duplicator and its retry
//! executor, the global loading indicator, the clock and the failure sink. It
//! is built once from a [`RuntimeConfig`] and handed around by reference or
//! `Arc`.

use crate::batch::BatchProcessor;
use crate::cache::BoundedCache;
use crate::clock::{default_clock, Clock};
use crate::config::RuntimeConfig;
use crate::network::RequestDeduplicator;
use crate::operation::{AsyncOperation, GlobalLoader, OperationOptions, OperationPreset};
use crate::resilience::{Backoff, RetryExecutor};
use crate::telemetry::{noop_sink, FailureSink};
use crate::{Error, ErrorContext, Result};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tracing::info;

/// Cache of decoded responses keyed by request key.
pub type ResponseCache = BoundedCache<String, serde_json::Value>;

pub struct ContextBuilder {
    config: RuntimeConfig,
    clock: Option<Arc<dyn Clock>>,
    failure_sink: Option<Arc<dyn FailureSink>>,
}

impl ContextBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            clock: None,
            failure_sink: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Context> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(default_clock);
        let failure_sink = self.failure_sink.unwrap_or_else(noop_sink);
        let network = &self.config.network;

        let retry = Arc::new(
            RetryExecutor::new(Backoff::linear(network.retry_delay()))
                .with_clock(Arc::clone(&clock))
                .with_failure_sink(Arc::clone(&failure_sink))
                .with_report_policy(network.report_policy),
        );
        let deduplicator = Arc::new(
            RequestDeduplicator::new(retry).with_default_max_retries(network.max_retries),
        );
        let cache = Arc::new(ResponseCache::new(self.config.cache.max_size)?);

        info!(
            clock = clock.name(),
            cache_size = self.config.cache.max_size,
            max_retries = network.max_retries,
            report_policy = ?network.report_policy,
            "async-ops context initialized"
        );

        Ok(Context {
            config: self.config,
            clock,
            failure_sink,
            cache,
            deduplicator,
            global_loader: Arc::new(GlobalLoader::new()),
        })
    }
}

/// Application-wide components, constructed explicitly instead of as globals.
pub struct Context {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    failure_sink: Arc<dyn FailureSink>,
    cache: Arc<ResponseCache>,
    deduplicator: Arc<RequestDeduplicator>,
    global_loader: Arc<GlobalLoader>,
}

impl Context {
    pub fn builder(config: RuntimeConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    pub fn from_config(config: RuntimeConfig) -> Result<Self> {
        ContextBuilder::new(config).build()
    }

    /// Build from the file named by `ASYNC_OPS_CONFIG`, or defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_config(RuntimeConfig::from_env()?)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn failure_sink(&self) -> &Arc<dyn FailureSink> {
        &self.failure_sink
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn deduplicator(&self) -> &Arc<RequestDeduplicator> {
        &self.deduplicator
    }

    pub fn retry_executor(&self) -> &Arc<RetryExecutor> {
        self.deduplicator.retry_executor()
    }

    pub fn global_loader(&self) -> &Arc<GlobalLoader> {
        &self.global_loader
    }

    /// A runner configured from `preset`, including any configured overrides.
    pub fn operation<T, E>(&self, preset: OperationPreset) -> AsyncOperation<T, E>
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        self.operation_with(self.config.preset_options(preset))
    }

    /// A runner with explicit options, sharing this context's clock and global loader.
    pub fn operation_with<T, E>(&self, options: OperationOptions) -> AsyncOperation<T, E>
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        AsyncOperation::new(options)
            .with_clock(Arc::clone(&self.clock))
            .with_global_loader(Arc::clone(&self.global_loader))
    }

    /// A separate cache with the configured capacity.
    pub fn new_cache<K: Hash + Eq, V: Clone>(&self) -> Result<BoundedCache<K, V>> {
        BoundedCache::new(self.config.cache.max_size)
    }

    /// A batch processor using the configured batch size and flush interval.
    pub fn batch_processor<T, F, Fut, E>(&self, processor: F) -> BatchProcessor<T>
    where
        T: Send + 'static,
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        BatchProcessor::new_with_clock(
            self.config.batch.to_batch_config(),
            Arc::clone(&self.clock),
            processor,
        )
    }

    /// Flush and close the failure sink.
    pub async fn shutdown(&self) -> Result<()> {
        self.failure_sink.close().await.map_err(|e| {
            Error::configuration_with_context(
                format!("failed to close failure sink: {}", e),
                ErrorContext::new().with_source("context_shutdown"),
            )
        })
    }
}
