//! Build orchestrator.
//!
//! Runs a [`Builder`] on a trusted cache checkout and collects what it
//! produced into a [`BuildArtifact`]: the binaries in a private staging root
//! plus the legal files found in the checkout. The checkout itself is never
//! modified, and a failed build leaves the cache entry intact.

mod cargo;
mod legal;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::CacheEntry;
use crate::identity::ToolIdentity;
use crate::manifest::ToolDeclaration;
use crate::project::ProjectPaths;
use crate::revision::ResolvedRevision;
use crate::util::hash::ContentHash;

pub use cargo::CargoBuilder;
pub use legal::{LEGAL_FILE_NAMES, LegalFile, find_legal_files};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("build failed: {reason}")]
  BuildFailed { reason: String },

  #[error("build produced no binaries in {}", .0.display())]
  NoBinaries(PathBuf),

  #[error("crate directory '{}' does not exist in the checkout", .0.display())]
  MissingCrate(PathBuf),

  #[error("crate path '{0}' must be relative and stay inside the repository")]
  InvalidCratePath(String),

  #[error("failed to run '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Inputs for one toolchain invocation.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
  /// Directory holding the crate to build.
  pub source_tree: &'a Path,
  /// Install root; binaries must end up in `<output_root>/bin`.
  pub output_root: &'a Path,
  /// Directory for intermediate build products.
  pub target_dir: &'a Path,
}

/// The build capability.
pub trait Builder: Send + Sync {
  fn build(&self, request: &BuildRequest<'_>) -> Result<(), BuildError>;
}

/// Binaries and legal files produced from one checkout.
///
/// The staging directory is deleted when the artifact is dropped.
#[derive(Debug)]
pub struct BuildArtifact {
  pub identity: ToolIdentity,
  pub revision: ResolvedRevision,
  pub fingerprint: ContentHash,
  /// Absolute paths inside the staging directory.
  pub binaries: Vec<PathBuf>,
  pub legal_files: Vec<LegalFile>,
  _staging: TempDir,
}

impl BuildArtifact {
  /// File names of the produced binaries.
  pub fn binary_names(&self) -> Vec<String> {
    self
      .binaries
      .iter()
      .filter_map(|p| p.file_name())
      .map(|n| n.to_string_lossy().into_owned())
      .collect()
  }
}

pub struct BuildOrchestrator {
  paths: ProjectPaths,
  builder: Arc<dyn Builder>,
}

impl BuildOrchestrator {
  pub fn new(paths: ProjectPaths, builder: Arc<dyn Builder>) -> Self {
    Self { paths, builder }
  }

  pub fn build(&self, entry: &CacheEntry, declaration: &ToolDeclaration) -> Result<BuildArtifact, BuildError> {
    let crate_dir = crate_dir(&entry.path, declaration.path.as_deref())?;
    if !crate_dir.is_dir() {
      return Err(BuildError::MissingCrate(crate_dir));
    }

    let tmp = self.paths.tmp_dir();
    fs::create_dir_all(&tmp).map_err(|source| io_err(&tmp, source))?;
    let staging = tempfile::Builder::new()
      .prefix("build-")
      .tempdir_in(&tmp)
      .map_err(|source| io_err(&tmp, source))?;

    let target_dir = self.paths.tool_target_dir(&entry.identity);
    fs::create_dir_all(&target_dir).map_err(|source| io_err(&target_dir, source))?;

    info!(identity = %entry.identity, rev = %entry.revision, path = %crate_dir.display(), "building");
    self.builder.build(&BuildRequest {
      source_tree: &crate_dir,
      output_root: staging.path(),
      target_dir: &target_dir,
    })?;

    let binaries = collect_binaries(&staging.path().join("bin"))?;
    if binaries.is_empty() {
      return Err(BuildError::NoBinaries(staging.path().join("bin")));
    }
    let legal_files = find_legal_files(&entry.path).map_err(|source| io_err(&entry.path, source))?;
    debug!(
      identity = %entry.identity,
      binaries = binaries.len(),
      legal_files = legal_files.len(),
      "build finished"
    );

    Ok(BuildArtifact {
      identity: entry.identity.clone(),
      revision: entry.revision.clone(),
      fingerprint: entry.fingerprint.clone(),
      binaries,
      legal_files,
      _staging: staging,
    })
  }
}

/// Join the declared crate subdirectory onto the checkout root.
fn crate_dir(root: &Path, sub: Option<&str>) -> Result<PathBuf, BuildError> {
  let Some(sub) = sub.map(str::trim).filter(|s| !s.is_empty()) else {
    return Ok(root.to_path_buf());
  };

  let relative = Path::new(sub);
  let escapes = relative
    .components()
    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
  if escapes {
    return Err(BuildError::InvalidCratePath(sub.to_string()));
  }
  Ok(root.join(relative))
}

fn collect_binaries(bin_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
  let entries = match fs::read_dir(bin_dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(source) => return Err(io_err(bin_dir, source)),
  };

  let mut binaries = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|source| io_err(bin_dir, source))?;
    let path = entry.path();
    if path.is_file() {
      binaries.push(path);
    }
  }
  binaries.sort();
  Ok(binaries)
}

fn io_err(path: &Path, source: io::Error) -> BuildError {
  BuildError::Io {
    path: path.to_path_buf(),
    source,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::hash_bytes;
  use crate::util::testutil::FakeBuilder;

  fn entry(root: &Path) -> CacheEntry {
    CacheEntry {
      identity: ToolIdentity::new("example.com/org/tool").unwrap(),
      path: root.to_path_buf(),
      revision: ResolvedRevision("a".repeat(40)),
      location: "https://example.com/org/tool.git".to_string(),
      fingerprint: hash_bytes(b"tree"),
      generation: 1,
    }
  }

  fn declaration(path: Option<&str>) -> ToolDeclaration {
    ToolDeclaration {
      identity: ToolIdentity::new("example.com/org/tool").unwrap(),
      source: "https://example.com/org/tool.git".to_string(),
      fork: None,
      rev: "v1".to_string(),
      path: path.map(String::from),
    }
  }

  fn setup() -> (TempDir, ProjectPaths, PathBuf) {
    let temp = TempDir::new().unwrap();
    let paths = ProjectPaths::new(temp.path().join("project"));
    let checkout = temp.path().join("checkout");
    fs::create_dir_all(&checkout).unwrap();
    (temp, paths, checkout)
  }

  #[test]
  fn collects_binaries_and_legal_files() {
    let (_temp, paths, checkout) = setup();
    fs::write(checkout.join("VERSION"), "1.0.3").unwrap();
    fs::write(checkout.join("LICENSE-MIT"), "MIT").unwrap();

    let orchestrator = BuildOrchestrator::new(paths.clone(), Arc::new(FakeBuilder::new()));
    let artifact = orchestrator.build(&entry(&checkout), &declaration(None)).unwrap();

    assert_eq!(artifact.binary_names(), vec![format!("tool{}", std::env::consts::EXE_SUFFIX)]);
    assert_eq!(fs::read_to_string(&artifact.binaries[0]).unwrap(), "1.0.3");
    assert_eq!(artifact.legal_files.len(), 1);
    assert!(paths.tool_target_dir(&artifact.identity).is_dir());
  }

  #[test]
  fn staging_is_removed_with_artifact() {
    let (_temp, paths, checkout) = setup();
    let orchestrator = BuildOrchestrator::new(paths.clone(), Arc::new(FakeBuilder::new()));

    let artifact = orchestrator.build(&entry(&checkout), &declaration(None)).unwrap();
    let staged = artifact.binaries[0].clone();
    assert!(staged.exists());

    drop(artifact);
    assert!(!staged.exists());
    assert_eq!(fs::read_dir(paths.tmp_dir()).unwrap().count(), 0);
  }

  #[test]
  fn builds_declared_subdirectory() {
    let (_temp, paths, checkout) = setup();
    fs::create_dir_all(checkout.join("crates/cli")).unwrap();
    fs::write(checkout.join("crates/cli/NAME"), "tool-cli").unwrap();

    let orchestrator = BuildOrchestrator::new(paths, Arc::new(FakeBuilder::new()));
    let artifact = orchestrator
      .build(&entry(&checkout), &declaration(Some("crates/cli")))
      .unwrap();
    assert_eq!(artifact.binary_names(), vec![format!("tool-cli{}", std::env::consts::EXE_SUFFIX)]);
  }

  #[test]
  fn escaping_crate_path_is_rejected() {
    let (_temp, paths, checkout) = setup();
    let orchestrator = BuildOrchestrator::new(paths, Arc::new(FakeBuilder::new()));

    let err = orchestrator
      .build(&entry(&checkout), &declaration(Some("../elsewhere")))
      .unwrap_err();
    assert!(matches!(err, BuildError::InvalidCratePath(_)));
  }

  #[test]
  fn missing_crate_directory_fails() {
    let (_temp, paths, checkout) = setup();
    let orchestrator = BuildOrchestrator::new(paths, Arc::new(FakeBuilder::new()));

    let err = orchestrator
      .build(&entry(&checkout), &declaration(Some("crates/missing")))
      .unwrap_err();
    assert!(matches!(err, BuildError::MissingCrate(_)));
  }

  #[test]
  fn builder_failure_leaves_checkout_alone() {
    let (_temp, paths, checkout) = setup();
    fs::write(checkout.join("BROKEN"), "").unwrap();
    let before = crate::util::hash::hash_tree(&checkout, &[]).unwrap();

    let orchestrator = BuildOrchestrator::new(paths.clone(), Arc::new(FakeBuilder::new()));
    let err = orchestrator.build(&entry(&checkout), &declaration(None)).unwrap_err();

    assert!(matches!(err, BuildError::BuildFailed { reason } if reason.contains("E0425")));
    assert_eq!(crate::util::hash::hash_tree(&checkout, &[]).unwrap(), before);
    assert_eq!(fs::read_dir(paths.tmp_dir()).unwrap().count(), 0);
  }

  struct NoOutput;

  impl Builder for NoOutput {
    fn build(&self, _request: &BuildRequest<'_>) -> Result<(), BuildError> {
      Ok(())
    }
  }

  #[test]
  fn build_without_binaries_fails() {
    let (_temp, paths, checkout) = setup();
    let orchestrator = BuildOrchestrator::new(paths, Arc::new(NoOutput));

    let err = orchestrator.build(&entry(&checkout), &declaration(None)).unwrap_err();
    assert!(matches!(err, BuildError::NoBinaries(_)));
  }
}
