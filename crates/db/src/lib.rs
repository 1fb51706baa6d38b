//! `db` crate: persistence layer.
//!
//! Defines the [`Store`] capability set the engine depends on, plus two
//! implementations: [`PgStore`] (Postgres via sqlx, credentials encrypted at
//! rest) and [`MemoryStore`] (in-process, for tests and local runs).

pub mod cipher;
pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod store;

pub use cipher::CredentialCipher;
pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use postgres::PgStore;
pub use store::Store;
