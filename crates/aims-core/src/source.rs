//! External data source abstractions.
//!
//! Fetching activity documents and codelist reference data from the remote
//! datastore is out of scope for this engine; these traits are the seams
//! where those collaborators plug in. Tests use in-memory fakes.

use std::future::Future;

use crate::version::Version;

/// Query parameters forwarded verbatim to the upstream datastore.
pub type QueryParams = Vec<(String, String)>;

/// Attribute namespace under which the upstream datastore annotates each
/// activity element with its schema version.
pub const DATASTORE_NS: &str = "http://datastore.iatistandard.org/ns";

/// A source of raw activity elements.
///
/// Each returned string is one `iati-activity` element, carrying a findable
/// `iati-identifier` child and a `version` attribute in [`DATASTORE_NS`].
pub trait ActivitySource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn activities<'a>(
    &'a self,
    params: &'a QueryParams,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;
}

/// A source of codelist reference data.
///
/// `Ok(None)` means "this codelist does not exist for this version" — a
/// normal condition, not an error; sweeps skip it.
pub trait CodelistSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch one codelist's XML by name and version.
  fn codelist<'a>(
    &'a self,
    name: &'a str,
    version: Version,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Fetch the codelist mapping document for a version.
  fn codelist_mapping(
    &self,
    version: Version,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;
}
