//! Translation of sqlx failures into ledger errors.

use holdfast_core::LedgerError;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Failures while preparing the database for use.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The connection pool could not be established.
    #[error("Failed to connect: {0}")]
    Connect(#[source] sqlx::Error),

    /// The embedded migrations could not be applied.
    #[error("Migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// Map a sqlx error, keeping constraint violations distinguishable.
pub(crate) fn map_sqlx(error: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &error {
        let constraint = db.constraint().unwrap_or_default().to_string();
        match db.kind() {
            ErrorKind::UniqueViolation => return LedgerError::UniqueViolation { constraint },
            ErrorKind::ForeignKeyViolation => {
                return LedgerError::ForeignKeyViolation { constraint };
            }
            _ => {}
        }
    }

    match error {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            LedgerError::Corrupt(error.to_string())
        }
        other => LedgerError::Database(other.to_string()),
    }
}
