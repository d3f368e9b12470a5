//! Storage layer: hot buffer, durable archive and answer cache
//!
//! Production uses SQLite through sqlx; tests use in-memory implementations
//! with fault injection.

pub mod sim;
pub mod sqlite;
pub mod traits;

pub use sim::{SimArchive, SimCache, SimHotBuffer};
pub use sqlite::SqliteStore;
pub use traits::{AnswerCache, ArchiveStore, HotBuffer, StorageError, StorageResult};
