//! Error types for DataObjects
//!
//! One error enum covers the whole pipeline, from configuration loading
//! through source resolution and query execution to form validation.
//! Build-time failures are returned to the caller; data-fetch failures are
//! converted into structured page results at the query boundary.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for DataObjects
#[derive(Debug, Error)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// General configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Object type is neither `list` nor `form`
    #[error("Unknown object type '{0}', expected 'list' or 'form'")]
    UnknownObjectType(String),

    /// A source stack names no model, table or source type
    #[error("Data source '{0}' has no model, table or sourceType configured")]
    MissingSource(String),

    /// A property key or value is not accepted by its container
    #[error("Invalid property '{property}' on {container}: {message}")]
    InvalidProperty {
        container: String,
        property: String,
        message: String,
    },

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// A relation path segment could not be resolved
    #[error("Cannot resolve '{segment}' in path '{path}': {message}")]
    Resolution {
        path: String,
        segment: String,
        message: String,
    },

    /// A model or service name is not known to the query engine
    #[error("Unknown model or service '{0}'")]
    UnknownModel(String),

    /// A render function reference is not registered
    #[error("Render function '{0}' is not registered")]
    UnknownRenderFunction(String),

    // ========================================================================
    // Data Source Errors
    // ========================================================================
    /// Query execution failed in the underlying engine
    #[error("Data source error: {0}")]
    DataSource(String),

    /// The query plan cannot be executed as requested
    #[error("Query error: {0}")]
    Query(String),

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Field input did not pass validation
    #[error("Validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    // ========================================================================
    // Not Found Errors
    // ========================================================================
    /// Field not present in an object's registry
    #[error("Field '{field}' not found in object '{object}'")]
    FieldNotFound { object: String, field: String },

    /// Object not registered in the context
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Record not found in the data source
    #[error("Record '{id}' not found in '{source_name}'")]
    RecordNotFound { source_name: String, id: String },

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File read error
    #[error("Failed to read file '{path}': {message}")]
    FileRead { path: PathBuf, message: String },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON (de)serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

impl EngineError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    /// Create an invalid property error
    pub fn invalid_property(
        container: impl Into<String>,
        property: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        EngineError::InvalidProperty {
            container: container.into(),
            property: property.into(),
            message: msg.into(),
        }
    }

    /// Create a resolution error naming the failing path segment
    pub fn resolution(
        path: impl Into<String>,
        segment: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        EngineError::Resolution {
            path: path.into(),
            segment: segment.into(),
            message: msg.into(),
        }
    }

    /// Create a data source error
    pub fn data_source(msg: impl Into<String>) -> Self {
        EngineError::DataSource(msg.into())
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        EngineError::Query(msg.into())
    }

    /// Create a field validation error
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a field-not-found error
    pub fn field_not_found(object: impl Into<String>, field: impl Into<String>) -> Self {
        EngineError::FieldNotFound {
            object: object.into(),
            field: field.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Create an error with context
    pub fn with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_)
                | EngineError::UnknownObjectType(_)
                | EngineError::MissingSource(_)
                | EngineError::InvalidProperty { .. }
        )
    }

    /// Check if this error is a resolution error
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            EngineError::Resolution { .. }
                | EngineError::UnknownModel(_)
                | EngineError::UnknownRenderFunction(_)
        )
    }

    /// Check if this error originates in the data source
    pub fn is_data_source(&self) -> bool {
        matches!(self, EngineError::DataSource(_) | EngineError::Query(_))
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation { .. })
    }

    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::FieldNotFound { .. }
                | EngineError::ObjectNotFound(_)
                | EngineError::RecordNotFound { .. }
        )
    }

    /// Check if this error is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, EngineError::Io(_) | EngineError::FileRead { .. })
    }

    /// Render the error and its `source()` chain, outermost first.
    ///
    /// Used as the `trace` of structured data-source error payloads.
    pub fn trace(&self) -> Vec<String> {
        let mut trace = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            trace.push(err.to_string());
            source = err.source();
        }
        trace
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Toml(err.to_string())
    }
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> EngineResult<T>;
}

impl<T, E: Into<EngineError>> ResultExt<T> for Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> EngineResult<T> {
        self.map_err(|e| {
            let err: EngineError = e.into();
            EngineError::WithContext {
                context: context.into(),
                message: err.to_string(),
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
