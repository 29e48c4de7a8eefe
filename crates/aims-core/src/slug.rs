//! Identifier slugification.
//!
//! The same transform is applied in two places: deriving stable document
//! primary keys from IATI identifiers, and deriving materialized view names
//! from (row expression, version) pairs. It mirrors the `slugify` SQL
//! function the storage layer registers, so values computed in Rust and in
//! SQL agree byte for byte.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Slugify `value`: strip accents (NFKD, combining marks dropped), remove
/// quotes, lowercase, collapse every other non-alphanumeric run to a single
/// hyphen (existing hyphens and underscores pass through), and trim leading
/// and trailing hyphens.
pub fn slugify(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  let mut gap = false;

  for c in value.nfkd() {
    if is_combining_mark(c) || c == '\'' || c == '"' {
      continue;
    }
    for c in c.to_lowercase() {
      if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
        if gap && !out.is_empty() {
          out.push('-');
        }
        gap = false;
        out.push(c);
      } else {
        gap = true;
      }
    }
  }

  out.trim_matches('-').to_owned()
}

#[cfg(test)]
mod tests {
  use super::slugify;

  #[test]
  fn lowercases_and_hyphenates() {
    assert_eq!(slugify("XM-DAC 41114"), "xm-dac-41114");
    assert_eq!(slugify("GB-GOV-1/Programme 7"), "gb-gov-1-programme-7");
  }

  #[test]
  fn strips_accents_and_quotes() {
    assert_eq!(slugify("Café de l'État"), "cafe-de-letat");
  }

  #[test]
  fn collapses_runs_and_trims() {
    assert_eq!(slugify("  //a***b//  "), "a-b");
    assert_eq!(slugify("---"), "");
  }

  #[test]
  fn keeps_underscores_and_hyphens() {
    assert_eq!(slugify("iati_activity/transaction2.03"), "iati_activity-transaction2-03");
  }
}
