//! Error types for `aims-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A schema version string that is not `major.minor` with a two-digit
  /// minor part (e.g. `2.03`).
  #[error("invalid schema version: {0:?}")]
  InvalidVersion(String),

  #[error("unknown table kind: {0:?}")]
  UnknownTableKind(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
