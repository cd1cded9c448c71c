//! Sync planner: the per-tool state machine and the multi-tool runner.
//!
//! ```text
//! Unresolved -> Resolving -> CacheCheck -> UpToDate ----------------------------> Done
//!                                       \-> NeedsFetch -> NeedsBuild -> Installed -> Done
//!                                                      \-> BuildSkipped --------> Done   (dry run)
//! ```
//!
//! `Failed` is reachable from every state. Each tool runs under its own
//! exclusive lock; tools run concurrently up to [`SyncOptions::jobs`], and one
//! tool's failure never stops the others.

mod types;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::build::{BuildOrchestrator, Builder};
use crate::cache::{CacheEntry, SourceCache};
use crate::install::Installer;
use crate::lock::{FileLock, LockWait};
use crate::manifest::{InstalledRecord, ManifestStore, ToolDeclaration};
use crate::project::ProjectPaths;
use crate::resolve::RefResolver;
use crate::revision::{ResolvedRevision, RevisionSpec};
use crate::vcs::Vcs;

pub use types::*;

/// Runs tool pipelines for one project.
///
/// Cheap to clone; clones share the source cache, so a tool is fetched at
/// most once per planner.
#[derive(Clone)]
pub struct SyncPlanner {
  paths: ProjectPaths,
  store: ManifestStore,
  cache: Arc<SourceCache>,
  orchestrator: Arc<BuildOrchestrator>,
  installer: Arc<Installer>,
}

impl SyncPlanner {
  pub fn new(paths: ProjectPaths, vcs: Arc<dyn Vcs>, builder: Arc<dyn Builder>) -> Self {
    Self {
      store: ManifestStore::new(paths.clone()),
      cache: Arc::new(SourceCache::new(paths.clone(), vcs)),
      orchestrator: Arc::new(BuildOrchestrator::new(paths.clone(), builder)),
      installer: Arc::new(Installer::new(paths.clone())),
      paths,
    }
  }

  pub fn store(&self) -> &ManifestStore {
    &self.store
  }

  pub fn cache(&self) -> &SourceCache {
    &self.cache
  }

  /// Run the pipeline for every declared tool.
  ///
  /// Fails as a whole only when the declarations cannot be loaded; per-tool
  /// failures are reported in the returned [`SyncReport`].
  pub async fn run_all(&self, options: SyncOptions) -> Result<SyncReport, PipelineError> {
    let declarations = self.store.load_declarations()?;
    if declarations.is_empty() {
      info!("no tools declared");
      return Ok(SyncReport::default());
    }

    let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut join_set = JoinSet::new();

    for (index, declaration) in declarations.tools.into_iter().enumerate() {
      let planner = self.clone();
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore.acquire().await.ok();
        (index, planner.run_one(declaration, options.mode).await)
      });
    }

    let mut reports = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(report) => reports.push(report),
        Err(e) => error!(error = %e, "sync task panicked"),
      }
    }
    reports.sort_by_key(|(index, _)| *index);

    Ok(SyncReport {
      tools: reports.into_iter().map(|(_, report)| report).collect(),
    })
  }

  /// Run the pipeline for a single tool on the blocking pool.
  pub async fn run_one(&self, declaration: ToolDeclaration, mode: SyncMode) -> ToolReport {
    let identity = declaration.identity.clone();
    let rev = declaration.rev.clone();
    let planner = self.clone();

    match tokio::task::spawn_blocking(move || planner.run_tool(&declaration, mode)).await {
      Ok(report) => report,
      Err(e) => ToolReport {
        identity,
        rev,
        status: ToolStatus::Failed(PipelineError::Aborted(e.to_string())),
        trace: vec![PipelineState::Failed],
        elapsed: Default::default(),
      },
    }
  }

  /// Run the pipeline for a single tool on the current thread.
  pub fn run_tool(&self, declaration: &ToolDeclaration, mode: SyncMode) -> ToolReport {
    let started = Instant::now();
    let mut trace = vec![PipelineState::Unresolved];

    let status = match self.pipeline(declaration, mode, &mut trace) {
      Ok(status) => status,
      Err(err) => {
        warn!(identity = %declaration.identity, kind = err.kind(), error = %err, "pipeline failed");
        trace.push(PipelineState::Failed);
        ToolStatus::Failed(err)
      }
    };

    ToolReport {
      identity: declaration.identity.clone(),
      rev: declaration.rev.clone(),
      status,
      trace,
      elapsed: started.elapsed(),
    }
  }

  fn pipeline(
    &self,
    declaration: &ToolDeclaration,
    mode: SyncMode,
    trace: &mut Vec<PipelineState>,
  ) -> Result<ToolStatus, PipelineError> {
    let identity = &declaration.identity;
    let location = declaration.fetch_location();
    let spec = declaration.revision_spec();

    let _lock = FileLock::acquire(&self.paths.tool_lock_file(identity), LockWait::NonBlocking, mode.command())?;
    let installed = self.store.load_installed()?.installed.remove(identity);

    if mode == SyncMode::Build
      && let Some(entry) = self.reusable_entry(declaration, &spec)
    {
      debug!(identity = %identity, rev = %entry.revision, "building from cached source");
      return self.build_and_install(declaration, &entry, installed, trace);
    }

    trace.push(PipelineState::Resolving);
    let revision = RefResolver::new(&self.cache).resolve(identity, location, &spec)?;

    trace.push(PipelineState::CacheCheck);
    if mode != SyncMode::Build && self.is_up_to_date(declaration, &revision, installed.as_ref()) {
      info!(identity = %identity, rev = %revision, "up to date");
      trace.extend([PipelineState::UpToDate, PipelineState::Done]);
      return Ok(ToolStatus::UpToDate { revision });
    }

    trace.push(PipelineState::NeedsFetch);
    if mode == SyncMode::DryRun {
      trace.extend([PipelineState::BuildSkipped, PipelineState::Done]);
      return Ok(ToolStatus::Stale {
        revision,
        installed: installed.map(|r| r.revision),
      });
    }

    let entry = self.cache.ensure(identity, location, &revision)?;
    self.build_and_install(declaration, &entry, installed, trace)
  }

  fn build_and_install(
    &self,
    declaration: &ToolDeclaration,
    entry: &CacheEntry,
    installed: Option<InstalledRecord>,
    trace: &mut Vec<PipelineState>,
  ) -> Result<ToolStatus, PipelineError> {
    trace.push(PipelineState::NeedsBuild);
    let artifact = self.orchestrator.build(entry, declaration)?;

    trace.push(PipelineState::Installed);
    let record = self
      .store
      .record_installed_with(&declaration.identity, |state| -> Result<_, PipelineError> {
        Ok(self.installer.install(&artifact, state)?)
      })?;
    trace.push(PipelineState::Done);

    Ok(ToolStatus::Installed {
      revision: record.revision,
      previous: installed.map(|r| r.revision),
      binaries: record.binaries,
    })
  }

  /// A trusted, verified cache entry that `build` may use without resolving.
  ///
  /// The entry must come from the declared location. A fixed revision must
  /// equal the entry's; a symbolic one must resolve to it against the refs of
  /// the last fetch.
  fn reusable_entry(&self, declaration: &ToolDeclaration, spec: &RevisionSpec) -> Option<CacheEntry> {
    let identity = &declaration.identity;
    let entry = self.cache.entry(identity)?;
    if entry.location != declaration.fetch_location() {
      debug!(identity = %identity, cached = %entry.location, "cached source is from another location");
      return None;
    }

    let matches = match spec {
      RevisionSpec::Fixed(rev) => rev == &entry.revision,
      RevisionSpec::Symbolic(name) => {
        RefResolver::new(&self.cache).resolve_cached(identity, name).as_ref() == Some(&entry.revision)
      }
    };
    if !matches {
      debug!(identity = %identity, spec = %spec, cached = %entry.revision, "cached source is another revision");
      return None;
    }

    match self.cache.verify(&entry) {
      Ok(true) => Some(entry),
      Ok(false) => None,
      Err(e) => {
        warn!(identity = %declaration.identity, error = %e, "cannot verify cached source");
        None
      }
    }
  }

  fn is_up_to_date(
    &self,
    declaration: &ToolDeclaration,
    revision: &ResolvedRevision,
    installed: Option<&InstalledRecord>,
  ) -> bool {
    let Some(record) = installed else {
      return false;
    };
    if &record.revision != revision {
      return false;
    }
    let Some(entry) = self.cache.entry(&declaration.identity) else {
      return false;
    };
    if &entry.revision != revision || entry.fingerprint != record.fingerprint {
      return false;
    }
    self.cache.verify(&entry).unwrap_or(false)
  }
}
