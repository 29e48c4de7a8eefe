//! IATI schema versions and the process-level version configuration.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A fixed-point IATI schema version such as `2.03`.
///
/// Stored and compared as a `(major, minor)` pair so that no floating-point
/// representation ever enters the system. The canonical text form always
/// carries a two-digit minor part, matching how versions are written in
/// document attributes and in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
  major: u8,
  minor: u8,
}

impl Version {
  pub const fn new(major: u8, minor: u8) -> Self {
    Self { major, minor }
  }

  pub fn major(&self) -> u8 {
    self.major
  }

  pub fn minor(&self) -> u8 {
    self.minor
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.major, self.minor)
  }
}

impl FromStr for Version {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::InvalidVersion(s.to_owned());

    let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
    // A two-digit minor part is required: "2.3" and "2.30" are not the same
    // decimal, and IATI only ever publishes two-digit revisions.
    if minor.len() != 2 {
      return Err(invalid());
    }

    Ok(Self {
      major: major.parse().map_err(|_| invalid())?,
      minor: minor.parse().map_err(|_| invalid())?,
    })
  }
}

impl Serialize for Version {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Version {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// The enumerated set of schema versions a deployment supports, plus the
/// default assumed for new table registrations.
///
/// Supplied externally at process configuration time and passed explicitly
/// into the components that need it; nothing reads ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConfig {
  pub supported: Vec<Version>,
  pub default:   Version,
}

impl Default for VersionConfig {
  fn default() -> Self {
    Self {
      supported: vec![
        Version::new(2, 1),
        Version::new(2, 2),
        Version::new(2, 3),
      ],
      default:   Version::new(2, 3),
    }
  }
}

impl VersionConfig {
  /// The supported versions as the required set for cross-version queries.
  pub fn required(&self) -> BTreeSet<Version> {
    self.supported.iter().copied().collect()
  }
}
