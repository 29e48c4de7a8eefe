//! Error type for `aims-views`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// No registered tables share the aggregation's row expression, so there
  /// is nothing to UNION.
  #[error("no tables registered for row expression {0:?}")]
  NoTables(String),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),
}

impl Error {
  pub(crate) fn store<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(error))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
