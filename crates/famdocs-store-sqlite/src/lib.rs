//! SQLite backend for the famdocs datastore.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every call is a single closure on that
//! thread, so multi-statement operations run inside one transaction and never
//! interleave with another request's statements.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
