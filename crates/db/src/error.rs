//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored credential could not be encrypted or decrypted.
    #[error("credential cipher error: {0}")]
    Cipher(String),

    /// The backing store refused the operation (used by test doubles).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
