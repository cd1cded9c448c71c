//! Revision specifiers and resolved commit ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A revision as written by the user in a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RevisionSpec {
  /// A full-length commit id (SHA-1 or SHA-256). Never needs the network once present locally.
  Fixed(ResolvedRevision),
  /// A tag, branch or any other name that must be resolved against the remote.
  Symbolic(String),
}

impl RevisionSpec {
  pub fn parse(spec: &str) -> Self {
    let spec = spec.trim();
    if is_full_object_id(spec) {
      RevisionSpec::Fixed(ResolvedRevision(spec.to_ascii_lowercase()))
    } else {
      RevisionSpec::Symbolic(spec.to_string())
    }
  }

  pub fn is_fixed(&self) -> bool {
    matches!(self, RevisionSpec::Fixed(_))
  }
}

impl fmt::Display for RevisionSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RevisionSpec::Fixed(rev) => write!(f, "{}", rev),
      RevisionSpec::Symbolic(name) => write!(f, "{}", name),
    }
  }
}

/// An immutable commit id, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedRevision(pub String);

impl ResolvedRevision {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// First 12 characters, for display.
  pub fn short(&self) -> &str {
    self.0.get(..12).unwrap_or(&self.0)
  }
}

impl fmt::Display for ResolvedRevision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

fn is_full_object_id(spec: &str) -> bool {
  (spec.len() == 40 || spec.len() == 64) && spec.bytes().all(|b| b.is_ascii_hexdigit())
}
