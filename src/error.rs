use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for configuration and validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.max_concurrency")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "runnable_config", "dispatcher")
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

/// A failure raised by a model's generation primitive.
///
/// The original error is held behind an `Arc`, so every clone handed to a
/// callback handler and the one returned to the caller point at the same object.
#[derive(Clone)]
pub struct ModelError {
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl ModelError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(err),
        }
    }

    pub fn from_boxed(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self { inner: err.into() }
    }

    /// The original error as raised by the model.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn is<E: std::error::Error + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Whether both handles refer to the very same error object.
    pub fn ptr_eq(&self, other: &ModelError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Unified error type for the invocation runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised by the underlying model; passed through untouched.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The model does not implement the requested primitive and no fallback applies.
    #[error("{llm_type} does not implement {primitive}")]
    NotImplemented {
        primitive: &'static str,
        llm_type: String,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// A stream was dropped by its consumer before it was exhausted.
    #[error("stream dropped after {chunks} chunk(s) before completion")]
    StreamAbandoned { chunks: usize },

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
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
    /// Wrap an arbitrary error raised inside a model primitive.
    pub fn model<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Model(ModelError::new(err))
    }

    pub fn not_implemented(primitive: &'static str, llm_type: impl Into<String>) -> Self {
        Error::NotImplemented {
            primitive,
            llm_type: llm_type.into(),
        }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::Runtime {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented { .. })
    }

    /// The model failure carried by this error, if any.
    pub fn as_model(&self) -> Option<&ModelError> {
        match self {
            Error::Model(m) => Some(m),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Duplicate the error for fan-out to several runs.
    ///
    /// Model failures keep their identity; other variants are rebuilt from their
    /// parts, or rendered into a runtime error when they hold non-clonable sources.
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::Model(m) => Error::Model(m.clone()),
            Error::NotImplemented {
                primitive,
                llm_type,
            } => Error::NotImplemented {
                primitive: *primitive,
                llm_type: llm_type.clone(),
            },
            Error::Configuration { message, context } => Error::Configuration {
                message: message.clone(),
                context: context.clone(),
            },
            Error::Validation { message, context } => Error::Validation {
                message: message.clone(),
                context: context.clone(),
            },
            Error::StreamAbandoned { chunks } => Error::StreamAbandoned { chunks: *chunks },
            Error::Runtime { message, context } => Error::Runtime {
                message: message.clone(),
                context: context.clone(),
            },
            other => Error::runtime(other.to_string()),
        }
    }
}
