//! Declarations and installed-state record.
//!
//! # `tools.json`
//!
//! ```json
//! {
//!   "version": 1,
//!   "tools": [
//!     {
//!       "identity": "github.com/org/tool",
//!       "source": "https://github.com/org/tool.git",
//!       "fork": "https://github.com/me/tool.git",
//!       "rev": "v1.0.3"
//!     }
//!   ]
//! }
//! ```
//!
//! # `_tools/manifest.json`
//!
//! ```json
//! {
//!   "version": 1,
//!   "installed": {
//!     "github.com/org/tool": {
//!       "revision": "0123abcd...",
//!       "fingerprint": "9f86d081...",
//!       "binaries": ["tool"],
//!       "installedAt": 1733667300
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ManifestError;
use crate::identity::ToolIdentity;
use crate::revision::{ResolvedRevision, RevisionSpec};
use crate::util::hash::ContentHash;

/// Current format version of both files.
pub const MANIFEST_VERSION: u32 = 1;

/// A declared tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
  pub identity: ToolIdentity,

  /// Canonical source location. Determines the identity.
  pub source: String,

  /// Alternative location to fetch from. Does not change the identity.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fork: Option<String>,

  /// Revision as written by the user.
  pub rev: String,

  /// Subdirectory of the repository holding the crate to install.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
}

impl ToolDeclaration {
  /// Where sources are fetched from: the fork when declared, otherwise the source.
  pub fn fetch_location(&self) -> &str {
    self.fork.as_deref().unwrap_or(&self.source)
  }

  pub fn revision_spec(&self) -> RevisionSpec {
    RevisionSpec::parse(&self.rev)
  }
}

/// Contents of `tools.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarations {
  pub version: u32,
  #[serde(default)]
  pub tools: Vec<ToolDeclaration>,
}

impl Default for Declarations {
  fn default() -> Self {
    Self {
      version: MANIFEST_VERSION,
      tools: Vec::new(),
    }
  }
}

impl Declarations {
  pub fn is_empty(&self) -> bool {
    self.tools.is_empty()
  }

  pub fn get(&self, identity: &ToolIdentity) -> Option<&ToolDeclaration> {
    self.tools.iter().find(|t| &t.identity == identity)
  }

  /// Find a tool by full identity or, failing that, by unique short name.
  pub fn lookup(&self, name: &str) -> Result<&ToolDeclaration, ManifestError> {
    let name = name.trim().trim_matches('/');
    if let Some(exact) = self.tools.iter().find(|t| t.identity.as_str() == name) {
      return Ok(exact);
    }

    let matches: Vec<_> = self.tools.iter().filter(|t| t.identity.short_name() == name).collect();
    match matches.as_slice() {
      [] => Err(ManifestError::NotDeclared(name.to_string())),
      [single] => Ok(single),
      many => Err(ManifestError::AmbiguousName {
        name: name.to_string(),
        candidates: many.iter().map(|t| t.identity.to_string()).collect(),
      }),
    }
  }

  /// Reject duplicate identities that point at different sources, and
  /// identities nested under another declared identity.
  ///
  /// Exact duplicates collapse into the last entry.
  pub fn validate(&mut self) -> Result<(), ManifestError> {
    let mut seen: BTreeMap<ToolIdentity, usize> = BTreeMap::new();
    let mut deduped: Vec<ToolDeclaration> = Vec::with_capacity(self.tools.len());

    for tool in self.tools.drain(..) {
      match seen.get(&tool.identity) {
        Some(&idx) => {
          let existing = &deduped[idx];
          if existing.source != tool.source {
            return Err(ManifestError::ConflictingDeclaration {
              identity: tool.identity.to_string(),
              existing: existing.source.clone(),
              requested: tool.source,
            });
          }
          deduped[idx] = tool;
        }
        None => {
          seen.insert(tool.identity.clone(), deduped.len());
          deduped.push(tool);
        }
      }
    }

    for parent in &deduped {
      let nested = deduped.iter().find(|t| {
        t.identity
          .as_str()
          .strip_prefix(parent.identity.as_str())
          .is_some_and(|rest| rest.starts_with('/'))
      });
      if let Some(child) = nested {
        return Err(ManifestError::NestedIdentity {
          parent: parent.identity.to_string(),
          child: child.identity.to_string(),
        });
      }
    }

    self.tools = deduped;
    Ok(())
  }
}

/// The last known successful install of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledRecord {
  pub revision: ResolvedRevision,
  pub fingerprint: ContentHash,
  pub binaries: Vec<String>,
  /// Unix timestamp of the install.
  pub installed_at: u64,
}

/// Contents of `_tools/manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
  pub version: u32,
  #[serde(default)]
  pub installed: BTreeMap<ToolIdentity, InstalledRecord>,
}

impl Default for InstalledState {
  fn default() -> Self {
    Self {
      version: MANIFEST_VERSION,
      installed: BTreeMap::new(),
    }
  }
}

impl InstalledState {
  pub fn get(&self, identity: &ToolIdentity) -> Option<&InstalledRecord> {
    self.installed.get(identity)
  }

  /// The tool other than `except` whose record lists binary `name`.
  pub fn owner_of(&self, name: &str, except: &ToolIdentity) -> Option<&ToolIdentity> {
    self
      .installed
      .iter()
      .find(|(identity, record)| *identity != except && record.binaries.iter().any(|b| b == name))
      .map(|(identity, _)| identity)
  }
}
