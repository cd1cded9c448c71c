//! Installer: atomic placement of built binaries into `_tools/bin`.
//!
//! Every file is copied into a temporary file inside the destination
//! directory, flushed, given the source's permissions and renamed over its
//! final name. A reader of `_tools/bin/<name>` sees either the previous binary
//! or the complete new one, never a truncated file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::build::BuildArtifact;
use crate::identity::ToolIdentity;
use crate::manifest::{InstalledRecord, InstalledState, unix_now};
use crate::project::ProjectPaths;
use crate::util::fs::{remove_dir_all_if_exists, remove_file_if_exists};

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to install {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("installed {} has {actual} bytes, expected {expected}", path.display())]
  SizeMismatch { path: PathBuf, expected: u64, actual: u64 },

  #[error("refusing to install binary with invalid name '{0}'")]
  InvalidName(String),

  #[error("binary '{name}' is already installed by {owner}")]
  Claimed { name: String, owner: String },
}

pub struct Installer {
  paths: ProjectPaths,
}

impl Installer {
  pub fn new(paths: ProjectPaths) -> Self {
    Self { paths }
  }

  /// Place the artifact's binaries and legal files.
  ///
  /// `state` holds the installed records of the project. Nothing is placed
  /// when another tool's record already lists one of the artifact's binary
  /// names. Binaries of the tool's previous record that this build no longer
  /// produces are removed unless another tool lists them. Returns the record
  /// to store for the tool.
  pub fn install(&self, artifact: &BuildArtifact, state: &InstalledState) -> Result<InstalledRecord, InstallError> {
    let identity = &artifact.identity;
    let names = artifact.binary_names();
    for name in &names {
      if let Some(owner) = state.owner_of(checked_name(name)?, identity) {
        return Err(InstallError::Claimed {
          name: name.clone(),
          owner: owner.to_string(),
        });
      }
    }

    let bin_dir = self.paths.bin_dir();
    fs::create_dir_all(&bin_dir).map_err(|source| io_err(&bin_dir, source))?;

    for (source, name) in artifact.binaries.iter().zip(&names) {
      let dest = bin_dir.join(checked_name(name)?);
      place_file(source, &dest)?;
      verify_size(source, &dest)?;
      debug!(identity = %artifact.identity, path = %dest.display(), "installed binary");
    }

    if let Some(previous) = state.get(identity) {
      for stale in previous.binaries.iter().filter(|b| !names.contains(b)) {
        let Ok(stale) = checked_name(stale) else {
          warn!(name = %stale, "ignoring invalid binary name in installed record");
          continue;
        };
        if let Some(owner) = state.owner_of(stale, identity) {
          debug!(name = %stale, owner = %owner, "stale binary belongs to another tool");
          continue;
        }
        let path = bin_dir.join(stale);
        remove_file_if_exists(&path).map_err(|source| io_err(&path, source))?;
        info!(identity = %artifact.identity, path = %path.display(), "removed stale binary");
      }
    }

    let legal_dir = self.paths.tool_legal_dir(&artifact.identity);
    remove_dir_all_if_exists(&legal_dir).map_err(|source| io_err(&legal_dir, source))?;
    for legal in &artifact.legal_files {
      let dest = legal_dir.join(&legal.relative);
      if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
      }
      place_file(&legal.source, &dest)?;
    }

    info!(
      identity = %artifact.identity,
      rev = %artifact.revision,
      binaries = ?names,
      "installed"
    );

    Ok(InstalledRecord {
      revision: artifact.revision.clone(),
      fingerprint: artifact.fingerprint.clone(),
      binaries: names,
      installed_at: unix_now(),
    })
  }

  /// Remove a tool's binaries and legal files.
  ///
  /// Binaries that another tool in `state` lists are left in place.
  pub fn uninstall(
    &self,
    identity: &ToolIdentity,
    record: &InstalledRecord,
    state: &InstalledState,
  ) -> Result<(), InstallError> {
    let bin_dir = self.paths.bin_dir();
    for name in &record.binaries {
      let name = checked_name(name)?;
      if let Some(owner) = state.owner_of(name, identity) {
        warn!(name, owner = %owner, "keeping binary listed by another tool");
        continue;
      }
      let path = bin_dir.join(name);
      remove_file_if_exists(&path).map_err(|source| io_err(&path, source))?;
    }

    let legal_dir = self.paths.tool_legal_dir(identity);
    remove_dir_all_if_exists(&legal_dir).map_err(|source| io_err(&legal_dir, source))?;
    info!(identity = %identity, "uninstalled");
    Ok(())
  }
}

/// Binary names must be plain file names.
fn checked_name(name: &str) -> Result<&str, InstallError> {
  let plain = !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);
  if plain {
    Ok(name)
  } else {
    Err(InstallError::InvalidName(name.to_string()))
  }
}

/// Copy `source` over `dest` via a temporary file in `dest`'s directory.
fn place_file(source: &Path, dest: &Path) -> Result<(), InstallError> {
  let dir = dest.parent().unwrap_or_else(|| Path::new("."));
  let mut input = File::open(source).map_err(|e| io_err(source, e))?;
  let permissions = input.metadata().map_err(|e| io_err(source, e))?.permissions();

  let mut temp = tempfile::Builder::new()
    .prefix(".toolpin-")
    .tempfile_in(dir)
    .map_err(|e| io_err(dir, e))?;
  io::copy(&mut input, &mut temp).map_err(|e| io_err(dest, e))?;
  temp.as_file().sync_all().map_err(|e| io_err(dest, e))?;
  temp
    .as_file()
    .set_permissions(permissions)
    .map_err(|e| io_err(dest, e))?;

  persist(temp, dest)
}

fn persist(temp: NamedTempFile, dest: &Path) -> Result<(), InstallError> {
  temp.persist(dest).map_err(|e| io_err(dest, e.error))?;
  Ok(())
}

fn verify_size(source: &Path, dest: &Path) -> Result<(), InstallError> {
  let expected = fs::metadata(source).map_err(|e| io_err(source, e))?.len();
  let actual = fs::metadata(dest).map_err(|e| io_err(dest, e))?.len();
  if expected != actual {
    return Err(InstallError::SizeMismatch {
      path: dest.to_path_buf(),
      expected,
      actual,
    });
  }
  Ok(())
}

fn io_err(path: &Path, source: io::Error) -> InstallError {
  InstallError::Io {
    path: path.to_path_buf(),
    source,
  }
}
