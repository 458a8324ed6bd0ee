use color_eyre::{eyre::eyre, Result};
use std::fmt;

/// A versioned cache generation, named `prefix-vMAJOR.MINOR`.
///
/// Exactly one generation is current; every other name found in storage is
/// stale and removed on activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
  prefix: String,
  major: u32,
  minor: u32,
}

impl CacheGeneration {
  /// Build a generation from a prefix and a `MAJOR.MINOR` version string.
  pub fn new(prefix: &str, version: &str) -> Result<Self> {
    if prefix.is_empty() {
      return Err(eyre!("Cache prefix must not be empty"));
    }
    let (major, minor) = parse_version(version)
      .ok_or_else(|| eyre!("Invalid cache version '{}', expected MAJOR.MINOR", version))?;

    Ok(Self {
      prefix: prefix.to_string(),
      major,
      minor,
    })
  }

  /// Parse a stored cache name back into a generation.
  pub fn parse(name: &str) -> Option<Self> {
    let (prefix, version) = name.rsplit_once("-v")?;
    if prefix.is_empty() {
      return None;
    }
    let (major, minor) = parse_version(version)?;
    Some(Self {
      prefix: prefix.to_string(),
      major,
      minor,
    })
  }

  pub fn name(&self) -> String {
    self.to_string()
  }

  pub fn version(&self) -> (u32, u32) {
    (self.major, self.minor)
  }

  /// Whether `self` supersedes `other` within the same prefix.
  pub fn is_newer_than(&self, other: &CacheGeneration) -> bool {
    self.prefix == other.prefix && self.version() > other.version()
  }
}

impl fmt::Display for CacheGeneration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-v{}.{}", self.prefix, self.major, self.minor)
  }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
  let (major, minor) = version.split_once('.')?;
  Some((major.parse().ok()?, minor.parse().ok()?))
}
