//! The completion marker stored inside each cache slot.
//!
//! ```json
//! {
//!   "version": 1,
//!   "generation": 3,
//!   "status": "complete",
//!   "revision": "0123abcd...",
//!   "location": "https://github.com/org/tool.git",
//!   "fingerprint": "9f86d081..."
//! }
//! ```
//!
//! A slot is trusted only while its marker says `complete`. Every mutation of
//! the worktree first rewrites the marker as `incomplete` with the next
//! generation, so a crash or failure mid-update is visible to the next run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CacheError;
use crate::consts::CACHE_MARKER_FILENAME;
use crate::revision::ResolvedRevision;
use crate::util::fs::write_atomic;
use crate::util::hash::ContentHash;

const MARKER_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
  Incomplete,
  Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMarker {
  pub version: u32,
  pub generation: u64,
  pub status: MarkerStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub revision: Option<ResolvedRevision>,
  pub location: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fingerprint: Option<ContentHash>,
}

impl CacheMarker {
  pub fn incomplete(generation: u64, location: &str) -> Self {
    Self {
      version: MARKER_VERSION,
      generation,
      status: MarkerStatus::Incomplete,
      revision: None,
      location: location.to_string(),
      fingerprint: None,
    }
  }

  pub fn complete(generation: u64, location: &str, revision: ResolvedRevision, fingerprint: ContentHash) -> Self {
    Self {
      version: MARKER_VERSION,
      generation,
      status: MarkerStatus::Complete,
      revision: Some(revision),
      location: location.to_string(),
      fingerprint: Some(fingerprint),
    }
  }

  pub fn path(slot: &Path) -> PathBuf {
    slot.join(CACHE_MARKER_FILENAME)
  }

  /// Read the marker of a slot.
  ///
  /// A missing, unreadable or unparsable marker yields `None`: the slot is
  /// simply not trusted.
  pub fn read(slot: &Path) -> Option<Self> {
    let path = Self::path(slot);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "cannot read cache marker");
        return None;
      }
    };

    match serde_json::from_str::<CacheMarker>(&content) {
      Ok(marker) if marker.version == MARKER_VERSION => Some(marker),
      Ok(marker) => {
        warn!(path = %path.display(), version = marker.version, "unsupported cache marker version");
        None
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "corrupt cache marker");
        None
      }
    }
  }

  pub fn write(&self, slot: &Path) -> Result<(), CacheError> {
    let path = Self::path(slot);
    let content = serde_json::to_vec_pretty(self).map_err(|source| CacheError::Marker {
      path: path.clone(),
      source,
    })?;
    write_atomic(&path, &content).map_err(|source| CacheError::Io { path, source })
  }

  pub fn is_complete(&self) -> bool {
    self.status == MarkerStatus::Complete && self.revision.is_some() && self.fingerprint.is_some()
  }
}
