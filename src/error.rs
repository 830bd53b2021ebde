use std::time::Duration;
use thiserror::Error;

/// Structured error context for configuration and setup failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "cache.max_size")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "config_validator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Crate-level error for configuration and runtime setup.
///
/// Errors produced by the caller's own async functions never pass through this
/// type; they are carried unchanged inside [`OperationError::Failed`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Outcome error of a tracked operation.
///
/// `Failed` carries whatever the wrapped function returned, untouched. The
/// other variants are synthesized by the runner itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError<E> {
    /// The operation did not settle before its deadline.
    Timeout { timeout: Duration },
    /// The wrapped function failed.
    Failed(E),
    /// `retry()` was refused because the retry budget is spent.
    RetryLimitReached { retry_count: u32, max_retries: u32 },
    /// `retry()` was called before anything was executed.
    NothingToRetry,
}

impl<E> OperationError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, OperationError::Timeout { .. })
    }

    /// Short machine-friendly name of the error kind.
    pub fn name(&self) -> &'static str {
        match self {
            OperationError::Timeout { .. } => "TimeoutError",
            OperationError::Failed(_) => "OperationError",
            OperationError::RetryLimitReached { .. } => "RetryLimitReached",
            OperationError::NothingToRetry => "NothingToRetry",
        }
    }

    /// The wrapped function's error, if this is a pass-through failure.
    pub fn as_failed(&self) -> Option<&E> {
        match self {
            OperationError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_failed(self) -> Option<E> {
        match self {
            OperationError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for OperationError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationError::Timeout { timeout } => {
                write!(f, "operation timed out after {}ms", timeout.as_millis())
            }
            OperationError::Failed(e) => write!(f, "{}", e),
            OperationError::RetryLimitReached {
                retry_count,
                max_retries,
            } => write!(
                f,
                "retry refused: {} of {} retries already used",
                retry_count, max_retries
            ),
            OperationError::NothingToRetry => write!(f, "retry refused: nothing has been executed"),
        }
    }
}

impl<E> std::error::Error for OperationError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OperationError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display_includes_context() {
        let err = Error::configuration_with_context(
            "cache size must be non-zero",
            ErrorContext::new()
                .with_field_path("cache.max_size")
                .with_source("config_validator"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cache size must be non-zero"));
        assert!(msg.contains("field: cache.max_size"));
        assert!(msg.contains("source: config_validator"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("cache.max_size")
        );
    }

    #[test]
    fn test_operation_error_names() {
        let timeout: OperationError<String> = OperationError::Timeout {
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.name(), "TimeoutError");
        assert_eq!(timeout.to_string(), "operation timed out after 10ms");

        let failed: OperationError<String> = OperationError::Failed("boom".into());
        assert!(!failed.is_timeout());
        assert_eq!(failed.as_failed().map(String::as_str), Some("boom"));
        assert_eq!(failed.to_string(), "boom");
    }

    #[test]
    fn test_operation_error_source_is_wrapped_error() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = OperationError::Failed(io);
        assert!(err.source().is_some());
        let none: OperationError<std::io::Error> = OperationError::NothingToRetry;
        assert!(none.source().is_none());
    }
}
