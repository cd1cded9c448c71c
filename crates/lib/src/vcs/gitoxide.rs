//! [`Vcs`] implementation backed by `gix`.

use std::fs;
use std::path::Path;

use gix::bstr::ByteSlice;
use gix::objs::tree::EntryKind;
use gix::remote::Direction;
use tracing::{debug, info};

use super::{Vcs, VcsError};
use crate::consts::CACHE_MARKER_FILENAME;
use crate::revision::ResolvedRevision;

const FETCH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/remotes/origin/*", "+refs/tags/*:refs/tags/*"];

#[derive(Debug, Clone, Copy, Default)]
pub struct GixVcs;

impl GixVcs {
  pub fn new() -> Self {
    Self
  }
}

impl Vcs for GixVcs {
  fn clone_repo(&self, location: &str, dest: &Path) -> Result<(), VcsError> {
    info!(location, path = %dest.display(), "cloning repository");
    let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| VcsError::Clone {
      location: location.to_string(),
      source: e,
    };

    let mut prepared = gix::prepare_clone(location, dest)
      .map_err(|e| clone_err(Box::new(e)))?
      .configure_remote(|remote| Ok(remote.with_refspecs(Some(FETCH_REFSPECS[1]), Direction::Fetch)?));

    prepared
      .fetch_only(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| clone_err(Box::new(e)))?;

    Ok(())
  }

  fn fetch(&self, repo: &Path, location: &str) -> Result<(), VcsError> {
    debug!(location, path = %repo.display(), "fetching");
    let fetch_err = |e: Box<dyn std::error::Error + Send + Sync>| VcsError::Fetch {
      location: location.to_string(),
      source: e,
    };

    let repository = open(repo)?;
    let remote = repository
      .remote_at(location)
      .map_err(|e| fetch_err(Box::new(e)))?
      .with_refspecs(FETCH_REFSPECS, Direction::Fetch)
      .map_err(|e| fetch_err(Box::new(e)))?;

    remote
      .connect(Direction::Fetch)
      .map_err(|e| fetch_err(Box::new(e)))?
      .prepare_fetch(gix::progress::Discard, Default::default())
      .map_err(|e| fetch_err(Box::new(e)))?
      .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| fetch_err(Box::new(e)))?;

    Ok(())
  }

  fn resolve_ref(&self, repo: &Path, spec: &str) -> Result<ResolvedRevision, VcsError> {
    let repository = open(repo)?;
    let peeled = format!("{}^{{commit}}", spec);
    let id = repository
      .rev_parse_single(peeled.as_str())
      .map_err(|_| VcsError::RevisionNotFound { rev: spec.to_string() })?;

    Ok(ResolvedRevision(id.detach().to_string()))
  }

  fn checkout(&self, repo: &Path, rev: &ResolvedRevision) -> Result<(), VcsError> {
    let checkout_err = |e: Box<dyn std::error::Error + Send + Sync>| VcsError::Checkout {
      rev: rev.to_string(),
      source: e,
    };

    let repository = open(repo)?;
    let id = gix::ObjectId::from_hex(rev.as_str().as_bytes()).map_err(|e| checkout_err(Box::new(e)))?;
    let commit = repository
      .find_commit(id)
      .map_err(|_| VcsError::RevisionNotFound { rev: rev.to_string() })?;
    let tree = commit.tree().map_err(|e| checkout_err(Box::new(e)))?;

    let mut recorder = gix::traverse::tree::Recorder::default();
    tree
      .traverse()
      .breadthfirst(&mut recorder)
      .map_err(|e| checkout_err(Box::new(e)))?;

    clear_worktree(repo)?;

    for entry in recorder.records {
      let rel = gix::path::from_bstr(entry.filepath.as_bstr());
      let dest = repo.join(rel.as_ref());

      match entry.mode.kind() {
        EntryKind::Tree | EntryKind::Commit => {
          // Submodules are materialized as empty directories.
          fs::create_dir_all(&dest).map_err(|source| io_err(&dest, source))?;
        }
        EntryKind::Blob | EntryKind::BlobExecutable => {
          let object = repository
            .find_object(entry.oid)
            .map_err(|e| checkout_err(Box::new(e)))?;
          write_blob(&dest, &object.data, entry.mode.kind() == EntryKind::BlobExecutable)?;
        }
        EntryKind::Link => {
          let object = repository
            .find_object(entry.oid)
            .map_err(|e| checkout_err(Box::new(e)))?;
          write_link(&dest, &object.data)?;
        }
      }
    }

    debug!(path = %repo.display(), rev = %rev, "checked out");
    Ok(())
  }
}

fn open(path: &Path) -> Result<gix::Repository, VcsError> {
  gix::open(path).map_err(|e| VcsError::Open {
    path: path.to_path_buf(),
    source: Box::new(e),
  })
}

fn io_err(path: &Path, source: std::io::Error) -> VcsError {
  VcsError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Remove everything in the worktree except `.git` and the cache marker.
fn clear_worktree(repo: &Path) -> Result<(), VcsError> {
  let entries = fs::read_dir(repo).map_err(|source| io_err(repo, source))?;
  for entry in entries {
    let entry = entry.map_err(|source| io_err(repo, source))?;
    let name = entry.file_name();
    if name == ".git" || name == CACHE_MARKER_FILENAME {
      continue;
    }

    let path = entry.path();
    let file_type = entry.file_type().map_err(|source| io_err(&path, source))?;
    let result = if file_type.is_dir() {
      fs::remove_dir_all(&path)
    } else {
      fs::remove_file(&path)
    };
    result.map_err(|source| io_err(&path, source))?;
  }
  Ok(())
}

fn write_blob(dest: &Path, data: &[u8], executable: bool) -> Result<(), VcsError> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
  }
  fs::write(dest, data).map_err(|source| io_err(dest, source))?;

  #[cfg(unix)]
  if executable {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dest, fs::Permissions::from_mode(0o755)).map_err(|source| io_err(dest, source))?;
  }
  #[cfg(not(unix))]
  let _ = executable;

  Ok(())
}

#[cfg(unix)]
fn write_link(dest: &Path, target: &[u8]) -> Result<(), VcsError> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
  }
  let target = gix::path::from_bstr(target.as_bstr());
  std::os::unix::fs::symlink(target.as_ref(), dest).map_err(|source| io_err(dest, source))
}

#[cfg(not(unix))]
fn write_link(dest: &Path, target: &[u8]) -> Result<(), VcsError> {
  // Without symlink privileges the link is written as a plain file holding its target.
  write_blob(dest, target, false)
}
