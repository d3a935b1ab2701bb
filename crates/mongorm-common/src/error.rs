//! Error types for mongorm

use thiserror::Error;

/// Result type alias for mongorm operations
pub type Result<T> = std::result::Result<T, MongormError>;

/// Duplicate key server error code
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Unified error type for all mongorm operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MongormError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A sort or index direction token that is not in the applicable table
    #[error("Unknown direction '{token}' for {mode}")]
    UnknownDirection { token: String, mode: &'static str },

    /// The schema declares no collection of its own
    #[error("Schema '{0}' has no collection")]
    MissingCollection(String),

    /// Duplicate key on insert or update
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient transaction error - retryable
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MongormError {
    pub fn unknown_direction(token: impl Into<String>, for_index: bool) -> Self {
        MongormError::UnknownDirection {
            token: token.into(),
            mode: if for_index { "index" } else { "sort" },
        }
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, MongormError::Transient(_) | MongormError::Connection(_))
    }

    /// Returns true if this is a unique constraint violation
    pub fn is_conflict(&self) -> bool {
        matches!(self, MongormError::Conflict(_))
    }
}

impl From<serde_json::Error> for MongormError {
    fn from(err: serde_json::Error) -> Self {
        MongormError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for MongormError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};

        if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return MongormError::Transient(err.to_string());
        }

        match err.kind.as_ref() {
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
                MongormError::Connection(err.to_string())
            }
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if write_error.code == DUPLICATE_KEY_CODE =>
            {
                MongormError::Conflict(err.to_string())
            }
            _ => MongormError::MongoDB(err.to_string()),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for MongormError {
    fn from(err: bson::ser::Error) -> Self {
        MongormError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for MongormError {
    fn from(err: bson::de::Error) -> Self {
        MongormError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::oid::Error> for MongormError {
    fn from(err: bson::oid::Error) -> Self {
        MongormError::Validation(format!("Invalid ObjectId: {}", err))
    }
}
