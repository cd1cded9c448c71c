//! Version-control capability.
//!
//! The source cache and the ref resolver talk to repositories only through the
//! [`Vcs`] trait. [`GixVcs`] is the shipped implementation; tests substitute
//! an in-memory fake.

mod gitoxide;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::revision::ResolvedRevision;

pub use gitoxide::GixVcs;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum VcsError {
  #[error("failed to clone '{location}': {source}")]
  Clone {
    location: String,
    #[source]
    source: BoxError,
  },

  #[error("failed to open repository at '{}': {source}", path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: BoxError,
  },

  #[error("failed to fetch from '{location}': {source}")]
  Fetch {
    location: String,
    #[source]
    source: BoxError,
  },

  #[error("revision '{rev}' not found")]
  RevisionNotFound { rev: String },

  #[error("failed to check out '{rev}': {source}")]
  Checkout {
    rev: String,
    #[source]
    source: BoxError,
  },

  #[error("I/O error at '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Repository operations needed by the pipeline.
///
/// `repo` is always a working copy created by [`Vcs::clone_repo`]. All refs
/// fetched from a location land under `refs/remotes/origin/*` and `refs/tags/*`
/// regardless of which location (source or fork) they came from.
pub trait Vcs: Send + Sync {
  /// Create a repository at `dest` holding every branch and tag of `location`.
  /// Leaves the worktree empty.
  fn clone_repo(&self, location: &str, dest: &Path) -> Result<(), VcsError>;

  /// Update remote-tracking refs and tags of `repo` from `location`.
  fn fetch(&self, repo: &Path, location: &str) -> Result<(), VcsError>;

  /// Peel `spec` to a commit id using only local state.
  fn resolve_ref(&self, repo: &Path, spec: &str) -> Result<ResolvedRevision, VcsError>;

  /// Replace the worktree with the tree of `rev`.
  ///
  /// Everything outside `.git` is removed first except the cache marker.
  fn checkout(&self, repo: &Path, rev: &ResolvedRevision) -> Result<(), VcsError>;

  /// Whether the commit is present in the local object database.
  fn has_commit(&self, repo: &Path, rev: &ResolvedRevision) -> bool {
    self.resolve_ref(repo, rev.as_str()).is_ok_and(|found| &found == rev)
  }
}
