//! Error type for `aims-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] aims_core::Error),

  #[error("xml error: {0}")]
  Xml(#[from] aims_xml::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// An activity element without a findable `iati-identifier` child.
  #[error("activity element has no iati-identifier")]
  MissingIdentifier,

  /// An activity element without the datastore's namespaced `version`
  /// attribute.
  #[error("activity element has no version attribute")]
  MissingVersion,

  #[error("upstream source error: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// View creation failed; the projection was left absent. Carries the
  /// full offending SQL so failures are diagnosable from the error alone.
  #[error("unable to materialize {name:?}: {message}; SQL was {sql}")]
  Materialize {
    name:    String,
    message: String,
    sql:     String,
  },
}

impl Error {
  /// Whether this is SQLite's "relation does not exist" condition, the
  /// trigger for the single on-demand materialization retry. Statement
  /// preparation and statement execution report it through different
  /// variants, so both are matched.
  pub fn is_missing_relation(&self) -> bool {
    let message = match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(_, Some(message)),
      )) => message,
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqlInputError { msg, .. },
      )) => msg,
      _ => return false,
    };
    message.starts_with("no such table")
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
