use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum CoreError {
    /// Store connectivity or query failure. Fatal to the current call, not retried.
    StoreUnavailable(sqlx::Error),
    /// Referenced account does not exist.
    NotFound(String),
    /// Malformed filter values, rejected before query execution.
    InvalidFilter(String),
    /// Batch classification failure. The whole run is discarded, nothing is written.
    PipelineAborted(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<CoreError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::StoreUnavailable(e) => write!(f, "Store unavailable: {}", e),
            CoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CoreError::InvalidFilter(msg) => write!(f, "Invalid filter: {}", msg),
            CoreError::PipelineAborted(msg) => write!(f, "Pipeline aborted: {}", msg),
            CoreError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::StoreUnavailable(e) => Some(e),
            CoreError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::StoreUnavailable(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `CoreError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, CoreError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, CoreError> {
    fn context(self, context: impl Into<String>) -> Result<T, CoreError> {
        self.map_err(|e| CoreError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CoreError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, CoreError> {
        self.map_err(|e| CoreError::WithContext {
            source: Box::new(CoreError::StoreUnavailable(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CoreError::WithContext {
            source: Box::new(CoreError::StoreUnavailable(e)),
            context: f(),
        })
    }
}
