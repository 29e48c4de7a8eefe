//! Process configuration.
//!
//! Layered the usual way: built-in defaults, an optional TOML file, then
//! `AIMS_`-prefixed environment variables (e.g. `AIMS_DEFAULT_VERSION`).

use std::path::Path;

use aims_core::version::{Version, VersionConfig};
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Schema versions this deployment accepts and aggregates over.
  pub supported_versions: Vec<Version>,
  /// Version assumed where none is stated.
  pub default_version:    Version,
}

impl Default for Settings {
  fn default() -> Self {
    let cfg = VersionConfig::default();
    Self {
      supported_versions: cfg.supported,
      default_version:    cfg.default,
    }
  }
}

impl Settings {
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("AIMS"))
      .build()?
      .try_deserialize()?;
    Ok(settings)
  }

  pub fn version_config(&self) -> VersionConfig {
    VersionConfig {
      supported: self.supported_versions.clone(),
      default:   self.default_version,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_mirror_the_version_config() {
    let settings = Settings::default();
    assert_eq!(settings.supported_versions.len(), 3);
    assert_eq!(settings.default_version.to_string(), "2.03");
    assert_eq!(
      settings.version_config().required(),
      VersionConfig::default().required()
    );
  }

  #[test]
  fn file_overrides_defaults() {
    let path = std::env::temp_dir().join(format!(
      "aims-settings-{}.toml",
      std::process::id()
    ));
    std::fs::write(
      &path,
      "default_version = \"2.02\"\nsupported_versions = [\"2.02\", \"2.03\"]\n",
    )
    .unwrap();

    let settings = Settings::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(settings.default_version.to_string(), "2.02");
    assert_eq!(settings.supported_versions.len(), 2);
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let settings =
      Settings::load(Some(Path::new("/nonexistent/aims.toml"))).unwrap();
    assert_eq!(settings.default_version.to_string(), "2.03");
  }
}
