//! Error types for the database layer.

use thiserror::Error;

use crate::migration::Direction;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// A strict mapper met a row column the target record does not declare.
    #[error("missing destination name {column} in {record}")]
    UnmappedColumn { column: String, record: &'static str },

    /// A column value could not be converted to its field's type.
    #[error("cannot map column {column} into {record}: {reason}")]
    TypeMismatch {
        column: String,
        record: &'static str,
        reason: String,
    },

    /// A migration statement failed at the store.
    #[error("migration {step} ({direction}) failed: {message}")]
    Migration {
        step: String,
        direction: Direction,
        message: String,
    },

    /// Connection setup or teardown failed.
    #[error("Store connection error: {0}")]
    StoreConnection(String),

    /// SQLx error (query, execute, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state (bad definition, record invariant broken)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True when the error was caused by the store exposing columns the
    /// reading code does not know about.
    pub fn is_schema_drift(&self) -> bool {
        matches!(self, Self::UnmappedColumn { .. })
    }
}
