//! Query surface for the AIMS projection engine.
//!
//! Works against any [`aims_core::store::ProjectionStore`]: per-table reads
//! ([`tables`]) and the three cross-version aggregations
//! ([`aggregations`]), plus process configuration loading ([`settings`]).
//! HTTP transport and rendering are the caller's responsibility.

pub mod aggregations;
pub mod error;
pub mod settings;
pub mod tables;

pub use error::{Error, Result};
