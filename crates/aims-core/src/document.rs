//! Stored activity documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{slug::slugify, version::Version};

/// A stored source document: one `iati-activity` element with its raw XML
/// body and the schema version it conforms to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  /// Stable primary identifier, derived from the natural identifier by
  /// slugification. Immutable once created.
  pub id:              String,
  /// The natural identifier (`iati-identifier` element text, trimmed).
  /// Upserts are keyed on this.
  pub iati_identifier: String,
  /// Raw XML body of the activity element.
  pub content:         String,
  pub iati_version:    Version,
  pub updated_at:      DateTime<Utc>,
}

/// Input for a document upsert. Re-fetching the same natural identifier
/// replaces the body and version in place.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
  pub iati_identifier: String,
  pub content:         String,
  pub iati_version:    Version,
}

impl NewDocument {
  /// Build an upsert input; the natural identifier is trimmed here so every
  /// downstream comparison is whitespace-insensitive.
  pub fn new(iati_identifier: &str, content: &str, iati_version: Version) -> Self {
    Self {
      iati_identifier: iati_identifier.trim().to_owned(),
      content:         content.to_owned(),
      iati_version,
    }
  }

  /// The derived primary identifier. A pure function of the natural
  /// identifier, so it is stable across content updates.
  pub fn id(&self) -> String {
    slugify(&self.iati_identifier)
  }
}
