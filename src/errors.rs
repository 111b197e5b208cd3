//! Unified application error type.
//! All modules (db, core, config) return AppError to keep the error
//! handling consistent and easy to manage.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    // ---------------------------
    // Lookup errors
    // ---------------------------
    #[error("Operator not found: {0}")]
    OperatorNotFound(i64),

    #[error("No snapshot for operator {operator_id} on {day}")]
    SnapshotNotFound { operator_id: i64, day: String },

    // ---------------------------
    // Validation errors
    // ---------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid work status: {0}")]
    InvalidStatus(String),

    // ---------------------------
    // Serialization errors
    // ---------------------------
    #[error("Lock contention on operator {0}: retry the mutation")]
    Conflict(i64),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration")]
    ConfigLoad,

    #[error("Failed to save configuration")]
    ConfigSave,

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

impl AppError {
    /// True only for errors a caller may blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
