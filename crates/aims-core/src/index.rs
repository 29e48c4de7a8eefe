//! The Version Reconciliation Index.
//!
//! Column validity across schema versions is derived, never stored: a
//! column expression is valid for every version whose table declares it.
//! [`VersionIndex::common_columns`] is what makes cross-version UNION
//! queries safe — only columns proven present in *every* required version
//! survive, so member queries always agree on arity and names.

use std::collections::{BTreeMap, BTreeSet};

use crate::version::Version;

/// Per-row-expression mapping from generated column name to the set of
/// schema versions whose tables declare it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionIndex {
  by_column: BTreeMap<String, BTreeSet<Version>>,
}

impl VersionIndex {
  pub fn new(by_column: BTreeMap<String, BTreeSet<Version>>) -> Self {
    Self { by_column }
  }

  /// Fold one (column name, version) observation into the index.
  pub fn observe(&mut self, col_name: &str, version: Version) {
    self.by_column.entry(col_name.to_owned()).or_default().insert(version);
  }

  pub fn is_empty(&self) -> bool {
    self.by_column.is_empty()
  }

  pub fn versions(&self, col_name: &str) -> Option<&BTreeSet<Version>> {
    self.by_column.get(col_name)
  }

  pub fn columns(&self) -> impl Iterator<Item = &str> {
    self.by_column.keys().map(String::as_str)
  }

  /// Columns valid in every `required` version, minus any whose name starts
  /// with one of `excluded_prefixes`. Sorted by name, so callers composing
  /// UNION members get a deterministic column order.
  pub fn common_columns(
    &self,
    required: &BTreeSet<Version>,
    excluded_prefixes: &[&str],
  ) -> Vec<String> {
    self
      .by_column
      .iter()
      .filter(|(name, versions)| {
        !excluded_prefixes.iter().any(|p| name.starts_with(p))
          && required.is_subset(versions)
      })
      .map(|(name, _)| name.clone())
      .collect()
  }
}

impl FromIterator<(String, Version)> for VersionIndex {
  fn from_iter<I: IntoIterator<Item = (String, Version)>>(iter: I) -> Self {
    let mut index = Self::default();
    for (name, version) in iter {
      index.observe(&name, version);
    }
    index
  }
}
