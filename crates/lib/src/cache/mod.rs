//! Source cache: one working copy per tool identity.
//!
//! Each slot under `_tools/src/<identity>/` is a git working copy plus a
//! [`CacheMarker`]. Consumers only ever see a [`CacheEntry`] built from a
//! `complete` marker whose tree still hashes to the recorded fingerprint.
//!
//! # Update discipline
//!
//! - A slot without a repository is cloned and checked out in a staging
//!   directory and renamed into place with its `complete` marker already
//!   written. A failure leaves the slot absent.
//! - An existing slot is first marked `incomplete` (next generation), then
//!   fetched if needed and checked out in place, and only then marked
//!   `complete`. A failure leaves the `incomplete` marker behind and the next
//!   [`SourceCache::ensure`] fetches again before trusting anything.
//!
//! Fetches happen at most once per identity per [`SourceCache`] instance, so a
//! single command never hits the network twice for the same tool.

mod marker;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::CACHE_MARKER_FILENAME;
use crate::identity::ToolIdentity;
use crate::project::ProjectPaths;
use crate::revision::ResolvedRevision;
use crate::util::fs::remove_dir_all_if_exists;
use crate::util::hash::{ContentHash, TreeHashError, hash_tree};
use crate::vcs::{Vcs, VcsError};

pub use marker::{CacheMarker, MarkerStatus};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Vcs(#[from] VcsError),

  #[error("failed to fingerprint source tree: {0}")]
  Fingerprint(#[from] TreeHashError),

  #[error("failed to write cache marker {}: {source}", path.display())]
  Marker {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A trusted, fully checked-out cache slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub identity: ToolIdentity,
  pub path: PathBuf,
  pub revision: ResolvedRevision,
  pub location: String,
  pub fingerprint: ContentHash,
  pub generation: u64,
}

pub struct SourceCache {
  paths: ProjectPaths,
  vcs: Arc<dyn Vcs>,
  fetched: Mutex<HashSet<ToolIdentity>>,
}

impl SourceCache {
  pub fn new(paths: ProjectPaths, vcs: Arc<dyn Vcs>) -> Self {
    Self {
      paths,
      vcs,
      fetched: Mutex::new(HashSet::new()),
    }
  }

  pub fn slot_dir(&self, identity: &ToolIdentity) -> PathBuf {
    self.paths.slot_dir(identity)
  }

  /// Whether the slot holds a repository, trusted or not.
  pub fn has_repo(&self, identity: &ToolIdentity) -> bool {
    self.slot_dir(identity).join(".git").exists()
  }

  /// The slot's entry, if its marker is complete. Does not rehash the tree.
  pub fn entry(&self, identity: &ToolIdentity) -> Option<CacheEntry> {
    let slot = self.slot_dir(identity);
    if !slot.join(".git").exists() {
      return None;
    }
    let marker = CacheMarker::read(&slot)?;
    trusted_entry(identity, &slot, marker)
  }

  /// Rehash the entry's tree and compare it with the recorded fingerprint.
  pub fn verify(&self, entry: &CacheEntry) -> Result<bool, CacheError> {
    let current = fingerprint(&entry.path)?;
    if current != entry.fingerprint {
      warn!(identity = %entry.identity, path = %entry.path.display(), "cached source no longer matches its fingerprint");
      return Ok(false);
    }
    Ok(true)
  }

  /// Whether the commit is available in the slot without network access.
  pub fn has_commit(&self, identity: &ToolIdentity, rev: &ResolvedRevision) -> bool {
    self.has_repo(identity) && self.vcs.has_commit(&self.slot_dir(identity), rev)
  }

  /// Peel `spec` to a commit using only the slot's local refs.
  pub fn resolve_local(&self, identity: &ToolIdentity, spec: &str) -> Result<ResolvedRevision, VcsError> {
    self.vcs.resolve_ref(&self.slot_dir(identity), spec)
  }

  /// Bring the slot's object database up to date with `location`.
  ///
  /// Clones a missing repository (without trusting it as an entry) or fetches
  /// into an existing one. Only the first call per identity hits the network.
  pub fn refresh(&self, identity: &ToolIdentity, location: &str) -> Result<(), CacheError> {
    let slot = self.slot_dir(identity);
    if !slot.join(".git").exists() {
      let (_staging, repo) = self.stage_clone(identity, location)?;
      publish(&repo, &slot)?;
      info!(identity = %identity, path = %slot.display(), "cloned into cache");
      return Ok(());
    }

    if self.was_fetched(identity) {
      debug!(identity = %identity, "already fetched in this session");
      return Ok(());
    }

    self.vcs.fetch(&slot, location)?;
    self.mark_fetched(identity);
    Ok(())
  }

  /// Make the slot a trusted checkout of `revision`.
  pub fn ensure(
    &self,
    identity: &ToolIdentity,
    location: &str,
    revision: &ResolvedRevision,
  ) -> Result<CacheEntry, CacheError> {
    let slot = self.slot_dir(identity);
    if !slot.join(".git").exists() {
      let (_staging, repo) = self.stage_clone(identity, location)?;
      self.vcs.checkout(&repo, revision)?;
      let fingerprint = fingerprint(&repo)?;
      CacheMarker::complete(1, location, revision.clone(), fingerprint.clone()).write(&repo)?;
      publish(&repo, &slot)?;
      info!(identity = %identity, rev = %revision, path = %slot.display(), "cloned into cache");

      return Ok(CacheEntry {
        identity: identity.clone(),
        path: slot,
        revision: revision.clone(),
        location: location.to_string(),
        fingerprint,
        generation: 1,
      });
    }

    let marker = CacheMarker::read(&slot);
    if let Some(entry) = marker.clone().and_then(|m| trusted_entry(identity, &slot, m))
      && &entry.revision == revision
      && self.verify(&entry)?
    {
      debug!(identity = %identity, rev = %revision, "cache entry up to date");
      return Ok(entry);
    }

    let was_complete = marker.as_ref().is_some_and(CacheMarker::is_complete);
    let generation = marker.as_ref().map_or(0, |m| m.generation) + 1;
    CacheMarker::incomplete(generation, location).write(&slot)?;
    debug!(identity = %identity, generation, "cache entry marked incomplete");

    let missing = !self.vcs.has_commit(&slot, revision);
    if (!was_complete || missing) && !self.was_fetched(identity) {
      info!(identity = %identity, location, "fetching");
      self.vcs.fetch(&slot, location)?;
      self.mark_fetched(identity);
    }

    self.vcs.checkout(&slot, revision)?;
    let fingerprint = fingerprint(&slot)?;
    CacheMarker::complete(generation, location, revision.clone(), fingerprint.clone()).write(&slot)?;
    info!(identity = %identity, rev = %revision, generation, "cache entry complete");

    Ok(CacheEntry {
      identity: identity.clone(),
      path: slot,
      revision: revision.clone(),
      location: location.to_string(),
      fingerprint,
      generation,
    })
  }

  /// Stop trusting the slot. The next [`SourceCache::ensure`] re-fetches.
  pub fn invalidate(&self, identity: &ToolIdentity) -> Result<(), CacheError> {
    let slot = self.slot_dir(identity);
    if !slot.join(".git").exists() {
      return Ok(());
    }

    let marker = CacheMarker::read(&slot);
    let generation = marker.as_ref().map_or(0, |m| m.generation) + 1;
    let location = marker.map(|m| m.location).unwrap_or_default();
    CacheMarker::incomplete(generation, &location).write(&slot)?;

    self.forget_fetched(identity);
    info!(identity = %identity, generation, "cache entry invalidated");
    Ok(())
  }

  /// Clone into a fresh staging directory under `_tools/tmp`.
  ///
  /// The staging directory is removed when the returned guard drops, so a
  /// failure anywhere before [`publish`] leaves nothing behind.
  fn stage_clone(&self, identity: &ToolIdentity, location: &str) -> Result<(TempDir, PathBuf), CacheError> {
    let tmp = self.paths.tmp_dir();
    fs::create_dir_all(&tmp).map_err(|source| io_err(&tmp, source))?;
    let staging = tempfile::Builder::new()
      .prefix("clone-")
      .tempdir_in(&tmp)
      .map_err(|source| io_err(&tmp, source))?;
    let repo = staging.path().join("repo");

    self.vcs.clone_repo(location, &repo)?;
    self.mark_fetched(identity);
    Ok((staging, repo))
  }

  fn was_fetched(&self, identity: &ToolIdentity) -> bool {
    self.fetched.lock().map(|set| set.contains(identity)).unwrap_or(false)
  }

  fn mark_fetched(&self, identity: &ToolIdentity) {
    if let Ok(mut set) = self.fetched.lock() {
      set.insert(identity.clone());
    }
  }

  fn forget_fetched(&self, identity: &ToolIdentity) {
    if let Ok(mut set) = self.fetched.lock() {
      set.remove(identity);
    }
  }
}

fn trusted_entry(identity: &ToolIdentity, slot: &Path, marker: CacheMarker) -> Option<CacheEntry> {
  if !marker.is_complete() {
    return None;
  }
  Some(CacheEntry {
    identity: identity.clone(),
    path: slot.to_path_buf(),
    revision: marker.revision?,
    location: marker.location,
    fingerprint: marker.fingerprint?,
    generation: marker.generation,
  })
}

/// Move a staged repository into its slot.
fn publish(repo: &Path, slot: &Path) -> Result<(), CacheError> {
  // Whatever sits in the slot without a repository is debris.
  remove_dir_all_if_exists(slot).map_err(|source| io_err(slot, source))?;
  if let Some(parent) = slot.parent() {
    fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
  }
  fs::rename(repo, slot).map_err(|source| io_err(slot, source))
}

/// Fingerprint of a slot's worktree.
pub fn fingerprint(slot: &Path) -> Result<ContentHash, TreeHashError> {
  hash_tree(slot, &[".git", CACHE_MARKER_FILENAME])
}

fn io_err(path: &Path, source: io::Error) -> CacheError {
  CacheError::Io {
    path: path.to_path_buf(),
    source,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::FakeVcs;
  use tempfile::TempDir;

  const LOCATION: &str = "https://example.com/org/tool.git";

  struct Fixture {
    _temp: TempDir,
    paths: ProjectPaths,
    vcs: Arc<FakeVcs>,
    identity: ToolIdentity,
  }

  impl Fixture {
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      Self {
        paths: ProjectPaths::new(temp.path()),
        _temp: temp,
        vcs: Arc::new(FakeVcs::new()),
        identity: ToolIdentity::from_location(LOCATION).unwrap(),
      }
    }

    /// A fresh cache, as a new command invocation would create.
    fn cache(&self) -> SourceCache {
      SourceCache::new(self.paths.clone(), self.vcs.clone())
    }

    fn marker(&self) -> CacheMarker {
      CacheMarker::read(&self.paths.slot_dir(&self.identity)).unwrap()
    }
  }

  #[test]
  fn first_ensure_clones_and_marks_complete() {
    let fx = Fixture::new();
    let rev = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);

    let entry = fx.cache().ensure(&fx.identity, LOCATION, &rev).unwrap();

    assert_eq!(entry.revision, rev);
    assert_eq!(entry.generation, 1);
    assert_eq!(fs::read_to_string(entry.path.join("VERSION")).unwrap(), "1");
    assert!(fx.marker().is_complete());
    assert_eq!(fx.vcs.clones(), 1);
    // Staging directories are cleaned up.
    assert_eq!(fs::read_dir(fx.paths.tmp_dir()).unwrap().count(), 0);
  }

  #[test]
  fn ensure_at_same_revision_does_nothing() {
    let fx = Fixture::new();
    let rev = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    fx.cache().ensure(&fx.identity, LOCATION, &rev).unwrap();
    let checkouts = fx.vcs.checkouts();

    let entry = fx.cache().ensure(&fx.identity, LOCATION, &rev).unwrap();

    assert_eq!(entry.generation, 1);
    assert_eq!(fx.vcs.network_calls(), 1);
    assert_eq!(fx.vcs.checkouts(), checkouts);
  }

  #[test]
  fn switching_to_known_revision_needs_no_fetch() {
    let fx = Fixture::new();
    let v1 = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    let v2 = fx.vcs.publish(LOCATION, "v2", &[("VERSION", "2")]);
    fx.cache().ensure(&fx.identity, LOCATION, &v1).unwrap();

    let entry = fx.cache().ensure(&fx.identity, LOCATION, &v2).unwrap();

    assert_eq!(entry.generation, 2);
    assert_eq!(fs::read_to_string(entry.path.join("VERSION")).unwrap(), "2");
    assert_eq!(fx.vcs.fetches(), 0);
  }

  #[test]
  fn new_upstream_revision_is_fetched() {
    let fx = Fixture::new();
    let v1 = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    fx.cache().ensure(&fx.identity, LOCATION, &v1).unwrap();

    let v2 = fx.vcs.publish(LOCATION, "v2", &[("VERSION", "2")]);
    let entry = fx.cache().ensure(&fx.identity, LOCATION, &v2).unwrap();

    assert_eq!(entry.revision, v2);
    assert_eq!(fx.vcs.fetches(), 1);
  }

  #[test]
  fn failed_clone_leaves_slot_absent() {
    let fx = Fixture::new();
    let rev = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    fx.vcs.set_fail_checkouts(true);

    let result = fx.cache().ensure(&fx.identity, LOCATION, &rev);

    assert!(matches!(result, Err(CacheError::Vcs(VcsError::Checkout { .. }))));
    assert!(!fx.paths.slot_dir(&fx.identity).exists());
    assert_eq!(fs::read_dir(fx.paths.tmp_dir()).unwrap().count(), 0);
  }

  #[test]
  fn failed_update_is_never_trusted_and_recovers() {
    let fx = Fixture::new();
    let v1 = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    let v2 = fx.vcs.publish(LOCATION, "v2", &[("README", "two"), ("VERSION", "2")]);
    fx.cache().ensure(&fx.identity, LOCATION, &v1).unwrap();

    fx.vcs.set_fail_checkouts(true);
    assert!(fx.cache().ensure(&fx.identity, LOCATION, &v2).is_err());

    let marker = fx.marker();
    assert_eq!(marker.status, MarkerStatus::Incomplete);
    assert_eq!(marker.generation, 2);
    assert!(fx.cache().entry(&fx.identity).is_none());

    // The half-written tree is replaced, after a full re-fetch.
    fx.vcs.set_fail_checkouts(false);
    let fetches = fx.vcs.fetches();
    let entry = fx.cache().ensure(&fx.identity, LOCATION, &v2).unwrap();
    assert_eq!(fx.vcs.fetches(), fetches + 1);
    assert_eq!(entry.generation, 3);
    assert_eq!(fs::read_to_string(entry.path.join("VERSION")).unwrap(), "2");
  }

  #[test]
  fn failed_fetch_leaves_incomplete_marker() {
    let fx = Fixture::new();
    let v1 = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    fx.cache().ensure(&fx.identity, LOCATION, &v1).unwrap();

    let v2 = fx.vcs.publish(LOCATION, "v2", &[("VERSION", "2")]);
    fx.vcs.set_unreachable(true);
    let err = fx.cache().ensure(&fx.identity, LOCATION, &v2).unwrap_err();

    assert!(matches!(err, CacheError::Vcs(VcsError::Fetch { .. })));
    assert!(fx.cache().entry(&fx.identity).is_none());
  }

  #[test]
  fn tampered_tree_is_restored() {
    let fx = Fixture::new();
    let rev = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    let entry = fx.cache().ensure(&fx.identity, LOCATION, &rev).unwrap();

    fs::write(entry.path.join("VERSION"), "patched").unwrap();
    let cache = fx.cache();
    assert!(!cache.verify(&entry).unwrap());

    let restored = cache.ensure(&fx.identity, LOCATION, &rev).unwrap();
    assert_eq!(fs::read_to_string(restored.path.join("VERSION")).unwrap(), "1");
    assert_eq!(restored.fingerprint, entry.fingerprint);
    assert_eq!(restored.generation, 2);
  }

  #[test]
  fn invalidate_forces_refetch() {
    let fx = Fixture::new();
    let rev = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    let cache = fx.cache();
    cache.ensure(&fx.identity, LOCATION, &rev).unwrap();

    cache.invalidate(&fx.identity).unwrap();
    assert!(cache.entry(&fx.identity).is_none());

    cache.ensure(&fx.identity, LOCATION, &rev).unwrap();
    assert_eq!(fx.vcs.fetches(), 1);
    assert!(cache.entry(&fx.identity).is_some());
  }

  #[test]
  fn fork_reuses_identity_slot() {
    let fx = Fixture::new();
    let fork = "https://example.com/me/tool.git";
    let v1 = fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    let patched = fx.vcs.publish(fork, "v1-patched", &[("VERSION", "1-patched")]);
    fx.cache().ensure(&fx.identity, LOCATION, &v1).unwrap();

    let entry = fx.cache().ensure(&fx.identity, fork, &patched).unwrap();

    assert_eq!(entry.path, fx.paths.slot_dir(&fx.identity));
    assert_eq!(entry.location, fork);
    assert_eq!(fs::read_to_string(entry.path.join("VERSION")).unwrap(), "1-patched");
    assert_eq!(fx.vcs.clones(), 1);
  }

  #[test]
  fn refresh_clones_without_trusting_then_fetches_once() {
    let fx = Fixture::new();
    fx.vcs.publish(LOCATION, "v1", &[("VERSION", "1")]);
    let cache = fx.cache();

    cache.refresh(&fx.identity, LOCATION).unwrap();
    assert!(cache.has_repo(&fx.identity));
    assert!(cache.entry(&fx.identity).is_none());

    cache.refresh(&fx.identity, LOCATION).unwrap();
    assert_eq!(fx.vcs.network_calls(), 1);

    let next_session = fx.cache();
    next_session.refresh(&fx.identity, LOCATION).unwrap();
    next_session.refresh(&fx.identity, LOCATION).unwrap();
    assert_eq!(fx.vcs.fetches(), 1);
  }
}
