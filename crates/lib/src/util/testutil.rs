//! Test doubles for the pipeline: an in-memory git host and a fake toolchain.
//!
//! [`FakeVcs`] keeps "remote" repositories in memory and stores each local
//! repository's refs and commits in `.git/fake-state.json`, so staged clones
//! survive being renamed into their slot like a real repository would.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::build::{BuildError, BuildRequest, Builder};
use crate::consts::CACHE_MARKER_FILENAME;
use crate::revision::ResolvedRevision;
use crate::util::hash::hash_bytes;
use crate::vcs::{Vcs, VcsError};

type Files = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RepoState {
  refs: BTreeMap<String, String>,
  commits: BTreeMap<String, Files>,
}

#[derive(Default)]
pub struct FakeVcs {
  remotes: Mutex<HashMap<String, RepoState>>,
  unreachable: AtomicBool,
  fail_checkouts: AtomicBool,
  clones: AtomicUsize,
  fetches: AtomicUsize,
  checkouts: AtomicUsize,
}

impl FakeVcs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publish a commit on `main` of `location` and tag it. Returns the commit id.
  pub fn publish(&self, location: &str, tag: &str, files: &[(&str, &str)]) -> ResolvedRevision {
    let files: Files = files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let seed = format!("{location}\n{tag}\n{files:?}");
    let id = hash_bytes(seed.as_bytes()).0[..40].to_string();

    let mut remotes = self.remotes.lock().unwrap();
    let remote = remotes.entry(location.to_string()).or_default();
    remote.commits.insert(id.clone(), files);
    remote.refs.insert(format!("refs/tags/{tag}"), id.clone());
    remote.refs.insert("refs/heads/main".to_string(), id.clone());
    ResolvedRevision(id)
  }

  /// Point a branch of `location` at an existing commit.
  pub fn set_branch(&self, location: &str, branch: &str, rev: &ResolvedRevision) {
    let mut remotes = self.remotes.lock().unwrap();
    let remote = remotes.entry(location.to_string()).or_default();
    remote.refs.insert(format!("refs/heads/{branch}"), rev.0.clone());
  }

  pub fn set_unreachable(&self, unreachable: bool) {
    self.unreachable.store(unreachable, Ordering::SeqCst);
  }

  /// Make checkouts write one file and then fail.
  pub fn set_fail_checkouts(&self, fail: bool) {
    self.fail_checkouts.store(fail, Ordering::SeqCst);
  }

  pub fn clones(&self) -> usize {
    self.clones.load(Ordering::SeqCst)
  }

  pub fn fetches(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  /// Clones plus fetches.
  pub fn network_calls(&self) -> usize {
    self.clones() + self.fetches()
  }

  pub fn checkouts(&self) -> usize {
    self.checkouts.load(Ordering::SeqCst)
  }

  fn remote(&self, location: &str) -> Option<RepoState> {
    if self.unreachable.load(Ordering::SeqCst) {
      return None;
    }
    self.remotes.lock().unwrap().get(location).cloned()
  }
}

fn state_path(repo: &Path) -> std::path::PathBuf {
  repo.join(".git").join("fake-state.json")
}

fn read_state(repo: &Path) -> Result<RepoState, VcsError> {
  let content = fs::read_to_string(state_path(repo)).map_err(|e| VcsError::Open {
    path: repo.to_path_buf(),
    source: Box::new(e),
  })?;
  serde_json::from_str(&content).map_err(|e| VcsError::Open {
    path: repo.to_path_buf(),
    source: Box::new(e),
  })
}

fn write_state(repo: &Path, state: &RepoState) {
  fs::create_dir_all(repo.join(".git")).unwrap();
  fs::write(state_path(repo), serde_json::to_string(state).unwrap()).unwrap();
}

/// Remote refs as they appear after a fetch.
fn tracking_refs(remote: &RepoState) -> BTreeMap<String, String> {
  remote
    .refs
    .iter()
    .map(|(name, id)| match name.strip_prefix("refs/heads/") {
      Some(branch) => (format!("refs/remotes/origin/{branch}"), id.clone()),
      None => (name.clone(), id.clone()),
    })
    .collect()
}

impl Vcs for FakeVcs {
  fn clone_repo(&self, location: &str, dest: &Path) -> Result<(), VcsError> {
    let remote = self.remote(location).ok_or_else(|| VcsError::Clone {
      location: location.to_string(),
      source: "unreachable".into(),
    })?;
    self.clones.fetch_add(1, Ordering::SeqCst);

    let state = RepoState {
      refs: tracking_refs(&remote),
      commits: remote.commits,
    };
    write_state(dest, &state);
    Ok(())
  }

  fn fetch(&self, repo: &Path, location: &str) -> Result<(), VcsError> {
    let remote = self.remote(location).ok_or_else(|| VcsError::Fetch {
      location: location.to_string(),
      source: "unreachable".into(),
    })?;
    self.fetches.fetch_add(1, Ordering::SeqCst);

    let mut state = read_state(repo)?;
    state.refs.extend(tracking_refs(&remote));
    state.commits.extend(remote.commits);
    write_state(repo, &state);
    Ok(())
  }

  fn resolve_ref(&self, repo: &Path, spec: &str) -> Result<ResolvedRevision, VcsError> {
    let state = read_state(repo)?;
    let candidates = [
      spec.to_string(),
      format!("refs/remotes/{spec}"),
      format!("refs/tags/{spec}"),
    ];
    for candidate in candidates {
      if let Some(id) = state.refs.get(&candidate) {
        return Ok(ResolvedRevision(id.clone()));
      }
    }
    if state.commits.contains_key(spec) {
      return Ok(ResolvedRevision(spec.to_string()));
    }
    Err(VcsError::RevisionNotFound { rev: spec.to_string() })
  }

  fn checkout(&self, repo: &Path, rev: &ResolvedRevision) -> Result<(), VcsError> {
    let state = read_state(repo)?;
    let files = state
      .commits
      .get(rev.as_str())
      .ok_or_else(|| VcsError::RevisionNotFound { rev: rev.to_string() })?;
    self.checkouts.fetch_add(1, Ordering::SeqCst);

    for entry in fs::read_dir(repo).unwrap() {
      let entry = entry.unwrap();
      let name = entry.file_name();
      if name == ".git" || name == CACHE_MARKER_FILENAME {
        continue;
      }
      if entry.file_type().unwrap().is_dir() {
        fs::remove_dir_all(entry.path()).unwrap();
      } else {
        fs::remove_file(entry.path()).unwrap();
      }
    }

    let failing = self.fail_checkouts.load(Ordering::SeqCst);
    for (path, content) in files {
      let dest = repo.join(path);
      fs::create_dir_all(dest.parent().unwrap()).unwrap();
      fs::write(&dest, content).unwrap();
      if failing {
        return Err(VcsError::Checkout {
          rev: rev.to_string(),
          source: "interrupted".into(),
        });
      }
    }
    Ok(())
  }
}

/// A toolchain stand-in.
///
/// Produces one binary named after the tree's `NAME` file (default `tool`)
/// whose content is the tree's `VERSION` file. Fails when the tree contains
/// a `BROKEN` file.
#[derive(Default)]
pub struct FakeBuilder {
  builds: AtomicUsize,
}

impl FakeBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn builds(&self) -> usize {
    self.builds.load(Ordering::SeqCst)
  }
}

impl Builder for FakeBuilder {
  fn build(&self, request: &BuildRequest<'_>) -> Result<(), BuildError> {
    self.builds.fetch_add(1, Ordering::SeqCst);

    if request.source_tree.join("BROKEN").exists() {
      return Err(BuildError::BuildFailed {
        reason: "error[E0425]: cannot find value `x` in this scope".to_string(),
      });
    }

    let name = fs::read_to_string(request.source_tree.join("NAME")).unwrap_or_else(|_| "tool".to_string());
    let version = fs::read_to_string(request.source_tree.join("VERSION")).unwrap_or_default();

    let bin = request.output_root.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let binary = bin.join(format!("{}{}", name.trim(), std::env::consts::EXE_SUFFIX));
    fs::write(&binary, version).unwrap();

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
    }
    Ok(())
  }
}
