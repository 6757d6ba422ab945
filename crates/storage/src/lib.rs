//! Storage abstraction and implementations for watchtrail.
//!
//! This crate provides the `SessionStore` and `VideoCatalog` traits with a
//! JSON-file reference implementation, an in-memory store, and an optional
//! SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
#[cfg(feature = "json")]
pub mod json_storage;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{Result, SessionStore, StorageError, VideoCatalog};
#[cfg(feature = "json")]
pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
