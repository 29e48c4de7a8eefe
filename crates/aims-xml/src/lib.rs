//! XML document model and path evaluation for the projection engine.
//!
//! This crate is the "document-oriented XML query capability" the SQL
//! generator targets: it parses stored activity XML into a small element
//! tree and evaluates the XPath subset used by row and column expressions.
//! Matched row elements are addressed by *locators* — child-index paths
//! into the document — so column evaluation keeps full ancestor context
//! (`../@ref`, inherited `xml:lang`) without re-parsing or slicing
//! fragments.

mod dom;
mod path;

pub mod error;

pub use dom::{Element, parse};
pub use error::{Error, Result};
pub use path::{eval_column, resolve, row_locators, row_locators_at};
