//! Core types and trait definitions for the AIMS XML projection engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! It owns the domain model (documents, versioned tables, column
//! expressions), the SQL fragment builder and generator, the version
//! reconciliation index, and the [`store::ProjectionStore`] abstraction
//! implemented by storage backends.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod error;
pub mod index;
pub mod slug;
pub mod source;
pub mod sql;
pub mod store;
pub mod table;
pub mod version;

pub use error::{Error, Result};
pub use slug::slugify;
pub use version::{Version, VersionConfig};
