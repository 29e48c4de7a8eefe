//! SQLite backend for the AIMS projection store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The connection registers the
//! `slugify`, `xml_rowset` and `xml_path` SQL functions at startup; they
//! are what the generated projection queries execute against.

mod functions;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{CodelistReport, SqliteStore};

#[cfg(test)]
mod tests;
