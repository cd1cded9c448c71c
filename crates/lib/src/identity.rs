//! Tool identities and source locations.
//!
//! A tool identity is the stable logical name of a declared tool. It is derived
//! from the tool's source location and stays the same when a fork provides the
//! source, so cache slots and installed records never move with the fork.
//!
//! | Source location                        | Identity              |
//! |----------------------------------------|-----------------------|
//! | `https://github.com/org/tool.git`      | `github.com/org/tool` |
//! | `git@github.com:org/tool.git`          | `github.com/org/tool` |
//! | `github.com/org/tool`                  | `github.com/org/tool` |
//! | `/srv/git/tool`                        | `srv/git/tool`        |

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::SLOT_HASH_LEN;
use crate::util::hash::hash_bytes;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
  #[error("empty tool identity")]
  Empty,

  #[error("invalid component '{component}' in tool identity '{identity}'")]
  InvalidComponent { identity: String, component: String },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolIdentity(String);

impl ToolIdentity {
  /// Validate an already-normalized identity such as `github.com/org/tool`.
  pub fn new(identity: &str) -> Result<Self, IdentityError> {
    let trimmed = identity.trim().trim_matches('/');
    if trimmed.is_empty() {
      return Err(IdentityError::Empty);
    }

    for component in trimmed.split('/') {
      if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('\\')
        || component.contains(':')
      {
        return Err(IdentityError::InvalidComponent {
          identity: trimmed.to_string(),
          component: component.to_string(),
        });
      }
    }

    Ok(Self(trimmed.to_string()))
  }

  /// Derive the identity from a source location (URL, scp-style address or path).
  pub fn from_location(location: &str) -> Result<Self, IdentityError> {
    let mut rest = location.trim().replace('\\', "/");

    if let Some((_, after_scheme)) = rest.split_once("://") {
      rest = after_scheme.to_string();
      // Drop user info in front of the host.
      let host_end = rest.find('/').unwrap_or(rest.len());
      if let Some(at) = rest[..host_end].rfind('@') {
        rest = rest[at + 1..].to_string();
      }
    } else if let Some((host, path)) = split_scp_like(&rest) {
      rest = format!("{}/{}", host, path);
    } else if has_drive_prefix(&rest) {
      rest = rest[2..].to_string();
    }

    let mut trimmed = rest.trim_end_matches('/');
    if let Some(stripped) = trimmed.strip_suffix(".git") {
      trimmed = stripped.trim_end_matches('/');
    }

    // Ports would otherwise end up as `host:port` components.
    let normalized = trimmed.trim_start_matches('/').replace(':', "_");
    Self::new(&normalized)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The identity as a relative, platform-native path.
  pub fn as_relative_path(&self) -> PathBuf {
    self.0.split('/').collect()
  }

  /// Last identity component, e.g. `tool` for `github.com/org/tool`.
  pub fn short_name(&self) -> &str {
    self.0.rsplit('/').next().unwrap_or(&self.0)
  }

  /// Flat, collision-resistant label: `{short_name}-{hash[:8]}`.
  pub fn slot_label(&self) -> String {
    let hash = hash_bytes(self.0.as_bytes());
    format!("{}-{}", self.short_name(), &hash.0[..SLOT_HASH_LEN])
  }

  /// Whether `name` refers to this tool, either by full identity or short name.
  pub fn matches_name(&self, name: &str) -> bool {
    self.0 == name.trim_matches('/') || self.short_name() == name
  }
}

impl fmt::Display for ToolIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl TryFrom<String> for ToolIdentity {
  type Error = IdentityError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::new(&value)
  }
}

impl From<ToolIdentity> for String {
  fn from(identity: ToolIdentity) -> Self {
    identity.0
  }
}

/// Normalize a user-supplied source argument into a fetchable location.
///
/// URLs and scp-style addresses are kept verbatim. Existing local paths
/// (relative to `base`) become absolute paths. Anything else is treated as a
/// host-qualified repository path and fetched over https.
pub fn normalize_source(input: &str, base: &Path) -> String {
  let input = input.trim();
  if input.contains("://") || split_scp_like(input).is_some() {
    return input.to_string();
  }

  let candidate = base.join(input);
  if candidate.exists() {
    return dunce::canonicalize(&candidate)
      .unwrap_or(candidate)
      .to_string_lossy()
      .to_string();
  }

  format!("https://{}", input.trim_end_matches('/'))
}

/// Split `user@host:path` into `(host, path)`.
fn split_scp_like(location: &str) -> Option<(&str, &str)> {
  if location.contains("://") || has_drive_prefix(location) {
    return None;
  }
  let (before, after) = location.split_once(':')?;
  if before.contains('/') || before.is_empty() || after.is_empty() {
    return None;
  }
  let host = before.rsplit('@').next().unwrap_or(before);
  Some((host, after))
}

fn has_drive_prefix(location: &str) -> bool {
  let bytes = location.as_bytes();
  bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes.len() == 2 || bytes[2] == b'/')
}
