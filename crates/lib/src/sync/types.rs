//! Pipeline states, outcomes and errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::build::BuildError;
use crate::cache::CacheError;
use crate::identity::ToolIdentity;
use crate::install::InstallError;
use crate::lock::LockError;
use crate::manifest::ManifestError;
use crate::resolve::ResolveError;
use crate::revision::ResolvedRevision;

/// States a tool passes through during one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Unresolved,
  Resolving,
  CacheCheck,
  UpToDate,
  NeedsFetch,
  NeedsBuild,
  BuildSkipped,
  Installed,
  Done,
  Failed,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Unresolved => "unresolved",
      PipelineState::Resolving => "resolving",
      PipelineState::CacheCheck => "cache-check",
      PipelineState::UpToDate => "up-to-date",
      PipelineState::NeedsFetch => "needs-fetch",
      PipelineState::NeedsBuild => "needs-build",
      PipelineState::BuildSkipped => "build-skipped",
      PipelineState::Installed => "installed",
      PipelineState::Done => "done",
      PipelineState::Failed => "failed",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
  /// Full pipeline; an installed record matching the cache short-circuits.
  Sync,
  /// Rebuild and reinstall, reusing a trusted cache entry without resolving.
  Build,
  /// Resolve and compare only. Nothing is fetched into the worktree, built or installed.
  DryRun,
}

impl SyncMode {
  /// Label recorded in lock metadata.
  pub fn command(&self) -> &'static str {
    match self {
      SyncMode::Sync => "sync",
      SyncMode::Build => "build",
      SyncMode::DryRun => "status",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
  pub mode: SyncMode,
  /// Maximum number of tool pipelines running at once.
  pub jobs: usize,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      mode: SyncMode::Sync,
      jobs: crate::consts::DEFAULT_JOBS,
    }
  }
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("cannot resolve revision: {0}")]
  UnresolvableRef(#[from] ResolveError),

  #[error("fetch failed: {0}")]
  FetchError(#[from] CacheError),

  #[error("{0}")]
  BuildFailed(#[from] BuildError),

  #[error("tool '{identity}' is declared from both {existing} and {requested}")]
  ConflictingDeclaration {
    identity: String,
    existing: String,
    requested: String,
  },

  #[error("install failed: {0}")]
  InstallFailed(#[from] InstallError),

  #[error("{0}")]
  Locked(#[from] LockError),

  #[error("{0}")]
  Manifest(#[source] ManifestError),

  #[error("pipeline aborted: {0}")]
  Aborted(String),
}

impl From<ManifestError> for PipelineError {
  fn from(err: ManifestError) -> Self {
    match err {
      ManifestError::ConflictingDeclaration {
        identity,
        existing,
        requested,
      } => PipelineError::ConflictingDeclaration {
        identity,
        existing,
        requested,
      },
      ManifestError::Lock(err) => PipelineError::Locked(err),
      other => PipelineError::Manifest(other),
    }
  }
}

impl PipelineError {
  /// Short category name for reports.
  pub fn kind(&self) -> &'static str {
    match self {
      PipelineError::UnresolvableRef(_) => "UnresolvableRef",
      PipelineError::FetchError(_) => "FetchError",
      PipelineError::BuildFailed(_) => "BuildFailed",
      PipelineError::ConflictingDeclaration { .. } => "ConflictingDeclaration",
      PipelineError::InstallFailed(_) => "InstallFailed",
      PipelineError::Locked(_) => "Locked",
      PipelineError::Manifest(_) => "Manifest",
      PipelineError::Aborted(_) => "Aborted",
    }
  }
}

/// Final outcome of one tool's pipeline.
#[derive(Debug)]
pub enum ToolStatus {
  UpToDate {
    revision: ResolvedRevision,
  },
  Installed {
    revision: ResolvedRevision,
    previous: Option<ResolvedRevision>,
    binaries: Vec<String>,
  },
  /// Dry run found the installed state behind the declared revision.
  Stale {
    revision: ResolvedRevision,
    installed: Option<ResolvedRevision>,
  },
  Failed(PipelineError),
}

impl ToolStatus {
  pub fn is_failure(&self) -> bool {
    matches!(self, ToolStatus::Failed(_))
  }
}

#[derive(Debug)]
pub struct ToolReport {
  pub identity: ToolIdentity,
  /// Revision as declared.
  pub rev: String,
  pub status: ToolStatus,
  /// States visited, in order.
  pub trace: Vec<PipelineState>,
  pub elapsed: Duration,
}

/// Outcomes of a multi-tool run, in declaration order.
#[derive(Debug, Default)]
pub struct SyncReport {
  pub tools: Vec<ToolReport>,
}

impl SyncReport {
  pub fn is_success(&self) -> bool {
    self.tools.iter().all(|t| !t.status.is_failure())
  }

  pub fn failures(&self) -> impl Iterator<Item = &ToolReport> {
    self.tools.iter().filter(|t| t.status.is_failure())
  }

  pub fn installed_count(&self) -> usize {
    self
      .tools
      .iter()
      .filter(|t| matches!(t.status, ToolStatus::Installed { .. }))
      .count()
  }

  pub fn up_to_date_count(&self) -> usize {
    self
      .tools
      .iter()
      .filter(|t| matches!(t.status, ToolStatus::UpToDate { .. }))
      .count()
  }
}
