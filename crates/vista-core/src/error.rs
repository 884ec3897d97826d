//! Error types module
//!
//! `StoreError` is the error surface of every relational store (media, vectors,
//! jobs, search index). Its variants distinguish the cases the pipeline reacts
//! to differently: a missing row, an idempotency conflict on insert, a
//! constraint violation and an opaque database failure.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A row with the same natural key already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Name kept for call sites that only deal with media rows.
pub type MediaStoreError = StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => StoreError::NotFound("row not found".to_string()),
            SqlxError::Database(db) if db.is_unique_violation() => {
                StoreError::AlreadyExists(db.message().to_string())
            }
            SqlxError::Database(db)
                if db.is_foreign_key_violation() || db.is_check_violation() =>
            {
                StoreError::ConstraintViolation(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_database_errors_are_transient() {
        assert!(!StoreError::NotFound("media abc123".into()).is_transient());
        assert!(!StoreError::AlreadyExists("media abc123".into()).is_transient());
        assert!(!StoreError::ConstraintViolation("fk".into()).is_transient());
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = StoreError::from(SqlxError::RowNotFound);
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_transient());
    }
}
