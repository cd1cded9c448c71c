//! Declarations (`tools.json`) and the installed-state record (`_tools/manifest.json`).
//!
//! Both files are JSON, loaded as empty when missing, and written atomically
//! while holding the manifest lock.

mod store;
mod types;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockError;

pub use store::{AddOutcome, ManifestStore, unix_now};
pub use types::*;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize {}: {source}", path.display())]
  Serialize {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported format version {version} in {}, expected {}", path.display(), MANIFEST_VERSION)]
  UnsupportedVersion { path: PathBuf, version: u32 },

  #[error("tool '{identity}' is already declared from {existing}, refusing to redeclare it from {requested}")]
  ConflictingDeclaration {
    identity: String,
    existing: String,
    requested: String,
  },

  #[error("tool '{child}' would be checked out inside the source of '{parent}', declare only one of them")]
  NestedIdentity { parent: String, child: String },

  #[error("tool '{0}' is not declared")]
  NotDeclared(String),

  #[error("tool name '{name}' is ambiguous, use one of: {}", candidates.join(", "))]
  AmbiguousName { name: String, candidates: Vec<String> },

  #[error(transparent)]
  Lock(#[from] LockError),
}
