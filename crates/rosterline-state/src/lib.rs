//! Relational identity store: external-id resolution and link rows.

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::{IdentityStore, LinkInsertOutcome};
pub use error::StoreError;
pub use sqlite::SqliteIdentityStore;
