//! Error types for flextable
//!
//! A single error enum covers configuration, validation, storage and
//! integrity failures. Failures raised inside `create`/`update`/`delete`
//! are wrapped in [`FlexError::Operation`] so the message names the
//! attempted operation and its attributes.

/// Result type alias for flextable operations
pub type FlexResult<T> = Result<T, FlexError>;

/// Error types for flexible model operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlexError {
    /// Missing database binding or invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rejected attribute key or value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Key is neither a declared attribute nor routable to flex data
    #[error("{model} has no attribute '{key}'")]
    UnknownAttribute { model: String, key: String },

    /// Declared and flex attributes share a key
    #[error("Conflict error: {0}")]
    Conflict(String),

    /// Backend failure while reading or writing rows
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend connection could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failure inside a create/update/delete scope
    #[error("{context}: {source}")]
    Operation {
        context: String,
        #[source]
        source: Box<FlexError>,
    },
}

impl FlexError {
    /// Wrap this error with a description of the attempted operation
    pub fn within<S: Into<String>>(self, context: S) -> Self {
        FlexError::Operation {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any operation wrappers
    pub fn root(&self) -> &FlexError {
        match self {
            FlexError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), FlexError::Validation(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), FlexError::Configuration(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), FlexError::Conflict(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.root(), FlexError::Storage(_))
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for FlexError {
    fn from(err: sqlx::Error) -> Self {
        FlexError::Storage(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for FlexError {
    fn from(err: serde_json::Error) -> Self {
        FlexError::Serialization(err.to_string())
    }
}

/// Attach operation context to a fallible result
pub trait ResultExt<T> {
    fn within<S, F>(self, context: F) -> FlexResult<T>
    where
        S: Into<String>,
        F: FnOnce() -> S;
}

impl<T> ResultExt<T> for FlexResult<T> {
    fn within<S, F>(self, context: F) -> FlexResult<T>
    where
        S: Into<String>,
        F: FnOnce() -> S,
    {
        self.map_err(|e| e.within(context()))
    }
}
