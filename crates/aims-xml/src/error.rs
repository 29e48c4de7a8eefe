//! Error type for `aims-xml`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("xml error: {0}")]
  Xml(String),

  #[error("document has no root element")]
  NoRoot,

  #[error("unbalanced element nesting near {0:?}")]
  Unbalanced(String),

  #[error("invalid node locator: {0:?}")]
  InvalidLocator(String),

  #[error("invalid path expression: {0:?}")]
  InvalidExpression(String),
}

impl From<quick_xml::Error> for Error {
  fn from(e: quick_xml::Error) -> Self {
    Error::Xml(e.to_string())
  }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
  fn from(e: quick_xml::events::attributes::AttrError) -> Self {
    Error::Xml(e.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
