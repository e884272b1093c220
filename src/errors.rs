//! Unified error type for the stokvel ledger.
//!
//! Every workflow returns [`Result`]. Business failures are split into validation,
//! not-found, authorization, conflict and capacity errors so an outer layer can map
//! them to user-facing messages without string matching.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// One or more input rules were violated. All violations are listed.
    #[error("Validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Not authorized: {message}")]
    Authorization { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Group {group_id} is at capacity ({max_members} members)")]
    Capacity { group_id: i64, max_members: i32 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![message.into()],
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Maps a unique-constraint violation to [`Error::Conflict`], passing
    /// every other database error through unchanged.
    pub fn from_insert(err: DbErr, conflict_message: &str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Self::conflict(conflict_message),
            _ => Self::Database(err),
        }
    }
}

/// Collects violated rules and turns them into a single [`Error::Validation`].
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.0.push(message.into());
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { errors: self.0 })
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
