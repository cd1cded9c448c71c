use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{Declarations, InstalledRecord, InstalledState, MANIFEST_VERSION, ManifestError, ToolDeclaration};
use crate::identity::ToolIdentity;
use crate::lock::{FileLock, LockWait};
use crate::project::ProjectPaths;
use crate::util::fs::write_atomic;

/// What [`ManifestStore::add_or_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
  Added,
  Updated,
  Unchanged,
}

/// Reads and writes the project's declarations and installed-state record.
#[derive(Debug, Clone)]
pub struct ManifestStore {
  paths: ProjectPaths,
}

impl ManifestStore {
  pub fn new(paths: ProjectPaths) -> Self {
    Self { paths }
  }

  pub fn paths(&self) -> &ProjectPaths {
    &self.paths
  }

  pub fn load(&self) -> Result<(Declarations, InstalledState), ManifestError> {
    Ok((self.load_declarations()?, self.load_installed()?))
  }

  /// Load `tools.json`. Missing file means no tools.
  pub fn load_declarations(&self) -> Result<Declarations, ManifestError> {
    let mut decls: Declarations = read_json(&self.paths.declarations_file())?.unwrap_or_default();
    decls.validate()?;
    Ok(decls)
  }

  /// Load `_tools/manifest.json`. Missing file means nothing installed.
  pub fn load_installed(&self) -> Result<InstalledState, ManifestError> {
    Ok(read_json(&self.paths.installed_file())?.unwrap_or_default())
  }

  /// Declare a tool, or update the declaration with the same identity.
  ///
  /// The same identity from a different source is a conflict and leaves the
  /// file untouched.
  pub fn add_or_update(&self, declaration: ToolDeclaration) -> Result<AddOutcome, ManifestError> {
    let _lock = self.lock()?;
    let mut decls = self.load_declarations()?;

    let outcome = match decls.tools.iter_mut().find(|t| t.identity == declaration.identity) {
      Some(existing) if existing.source != declaration.source => {
        return Err(ManifestError::ConflictingDeclaration {
          identity: declaration.identity.to_string(),
          existing: existing.source.clone(),
          requested: declaration.source,
        });
      }
      Some(existing) if *existing == declaration => AddOutcome::Unchanged,
      Some(existing) => {
        *existing = declaration.clone();
        AddOutcome::Updated
      }
      None => {
        decls.tools.push(declaration.clone());
        AddOutcome::Added
      }
    };

    if outcome != AddOutcome::Unchanged {
      decls.validate()?;
      write_json(&self.paths.declarations_file(), &decls)?;
    }
    info!(identity = %declaration.identity, rev = %declaration.rev, ?outcome, "declaration saved");
    Ok(outcome)
  }

  /// Change the revision (and optionally the fork) of a declared tool.
  pub fn upgrade(&self, name: &str, rev: &str, fork: Option<String>) -> Result<ToolDeclaration, ManifestError> {
    let _lock = self.lock()?;
    let mut decls = self.load_declarations()?;

    let identity = decls.lookup(name)?.identity.clone();
    let tool = decls
      .tools
      .iter_mut()
      .find(|t| t.identity == identity)
      .ok_or_else(|| ManifestError::NotDeclared(name.to_string()))?;

    tool.rev = rev.to_string();
    if fork.is_some() {
      tool.fork = fork;
    }
    let updated = tool.clone();

    write_json(&self.paths.declarations_file(), &decls)?;
    info!(identity = %updated.identity, rev, "declaration upgraded");
    Ok(updated)
  }

  /// Overwrite the installed record of a tool.
  pub fn record_installed(&self, identity: &ToolIdentity, record: InstalledRecord) -> Result<(), ManifestError> {
    self.record_installed_with(identity, |_| Ok::<_, ManifestError>(record))?;
    Ok(())
  }

  /// Produce a tool's installed record and store it.
  ///
  /// The manifest lock is held while `install` runs, so it sees the current
  /// records of every other tool and no other record can change meanwhile.
  pub fn record_installed_with<E, F>(&self, identity: &ToolIdentity, install: F) -> Result<InstalledRecord, E>
  where
    F: FnOnce(&InstalledState) -> Result<InstalledRecord, E>,
    E: From<ManifestError>,
  {
    let _lock = self.lock()?;
    let mut state = self.load_installed()?;
    let record = install(&state)?;

    debug!(identity = %identity, revision = %record.revision, "recording install");
    state.installed.insert(identity.clone(), record.clone());
    write_json(&self.paths.installed_file(), &state)?;
    Ok(record)
  }

  /// Drop a declaration together with its installed record.
  pub fn remove(&self, name: &str) -> Result<(ToolDeclaration, Option<InstalledRecord>), ManifestError> {
    let _lock = self.lock()?;
    let mut decls = self.load_declarations()?;

    let identity = decls.lookup(name)?.identity.clone();
    let position = decls
      .tools
      .iter()
      .position(|t| t.identity == identity)
      .ok_or_else(|| ManifestError::NotDeclared(name.to_string()))?;
    let removed = decls.tools.remove(position);
    write_json(&self.paths.declarations_file(), &decls)?;

    let mut state = self.load_installed()?;
    let record = state.installed.remove(&identity);
    if record.is_some() {
      write_json(&self.paths.installed_file(), &state)?;
    }

    info!(identity = %identity, "declaration removed");
    Ok((removed, record))
  }

  fn lock(&self) -> Result<FileLock, ManifestError> {
    Ok(FileLock::acquire(
      &self.paths.manifest_lock_file(),
      LockWait::Blocking,
      "manifest",
    )?)
  }
}

/// Current time as a Unix timestamp, for [`InstalledRecord::installed_at`].
pub fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

fn read_json<T>(path: &Path) -> Result<Option<T>, ManifestError>
where
  T: DeserializeOwned + Versioned,
{
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(ManifestError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let value: T = serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
    path: path.to_path_buf(),
    source,
  })?;

  if value.version() != MANIFEST_VERSION {
    return Err(ManifestError::UnsupportedVersion {
      path: path.to_path_buf(),
      version: value.version(),
    });
  }

  Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ManifestError> {
  let mut content = serde_json::to_string_pretty(value).map_err(|source| ManifestError::Serialize {
    path: path.to_path_buf(),
    source,
  })?;
  content.push('\n');

  write_atomic(path, content.as_bytes()).map_err(|source| ManifestError::Write {
    path: path.to_path_buf(),
    source,
  })
}

trait Versioned {
  fn version(&self) -> u32;
}

impl Versioned for Declarations {
  fn version(&self) -> u32 {
    self.version
  }
}

impl Versioned for InstalledState {
  fn version(&self) -> u32 {
    self.version
  }
}
