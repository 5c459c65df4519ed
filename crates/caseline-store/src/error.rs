// SPDX-License-Identifier: Apache-2.0

use caseline_model::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("illegal {entity} status transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("invalid input: {0}")]
    Invalid(ValidationError),

    #[error("stored row is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        Self::Invalid(err)
    }
}

impl StoreError {
    /// Constraint violations come back from SQLite as generic errors; fold
    /// them into `Conflict` so callers can map them to 409 instead of 500.
    /// The driver's own message never survives this fold, so it cannot end
    /// up in a response body.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict("resource already exists".to_string())
            }
            other => other,
        }
    }
}
