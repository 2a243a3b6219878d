//! Error types for the Thing registry.
//!
//! Lookups of unknown things surface as [`RegistryError::NotFound`] so API
//! layers can tell them apart from generic failures. Store failures carry the
//! underlying cause.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Thing registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    // Lookup errors
    #[error("Thing not found: {id}")]
    NotFound { id: String },

    #[error("Thing already exists: {id}")]
    Conflict { id: String },

    // Store errors
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Collaborator errors
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    #[error("Delivery to subscriber {subscriber} failed: {message}")]
    SubscriberDelivery { subscriber: u64, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::StoreUnavailable {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegistryError {
    /// Create a store error without an underlying SQLite cause.
    pub fn store(message: impl Into<String>) -> Self {
        RegistryError::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this is the distinguishable "not found" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Discovery subsystem error
    /// - -32002: Thing not found
    /// - -32009: Thing already exists
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            RegistryError::NotFound { .. } => -32002,
            RegistryError::Conflict { .. } => -32009,
            RegistryError::Discovery { .. } => -32000,
            RegistryError::InvalidParams { .. } | RegistryError::Json { .. } => -32602,
            _ => -32603,
        }
    }
}
