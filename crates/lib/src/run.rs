//! Running installed tools.
//!
//! Tools run with `_tools/bin` first on `PATH` and `CARGO_INSTALL_ROOT`
//! pointing at `_tools`, so a tool that itself installs or invokes other
//! project tools stays inside the project.

use std::env;
use std::ffi::OsStr;
use std::iter;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::debug;

use crate::manifest::{ManifestError, ManifestStore};
use crate::project::ProjectPaths;

#[derive(Debug, Error)]
pub enum RunError {
  #[error("tool '{0}' is not declared")]
  NotDeclared(String),

  #[error("tool '{name}' is declared but not installed, run `toolpin sync` first")]
  NotInstalled { name: String },

  #[error(transparent)]
  Manifest(ManifestError),

  #[error("cannot build PATH: {0}")]
  Path(#[from] env::JoinPathsError),

  #[error("failed to run {}: {source}", program.display())]
  Spawn {
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl From<ManifestError> for RunError {
  fn from(err: ManifestError) -> Self {
    match err {
      ManifestError::NotDeclared(name) => RunError::NotDeclared(name),
      other => RunError::Manifest(other),
    }
  }
}

/// Locate the binary for `name` in `_tools/bin`.
///
/// Any installed binary can be run by file name. When none exists, the
/// declarations decide between "not declared" and "not installed".
pub fn find_binary(store: &ManifestStore, name: &str) -> Result<PathBuf, RunError> {
  let paths = store.paths();
  let plain = !name.is_empty() && !name.contains(['/', '\\']);
  if plain {
    let candidate = paths.binary_path(name);
    if candidate.is_file() {
      return Ok(candidate);
    }
  }

  let declarations = store.load_declarations()?;
  let declaration = declarations.lookup(name)?;

  // A declared tool whose binary carries its short name.
  let candidate = paths.binary_path(declaration.identity.short_name());
  if candidate.is_file() {
    return Ok(candidate);
  }
  Err(RunError::NotInstalled { name: name.to_string() })
}

/// Build the command that runs `binary` in the project environment.
pub fn tool_command<I, S>(paths: &ProjectPaths, binary: &PathBuf, args: I) -> Result<Command, RunError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let existing = env::var_os("PATH").unwrap_or_default();
  let path = env::join_paths(iter::once(paths.bin_dir()).chain(env::split_paths(&existing)))?;

  let mut command = Command::new(binary);
  command
    .args(args)
    .env("PATH", path)
    .env("CARGO_INSTALL_ROOT", paths.tools_dir());
  Ok(command)
}

/// Run a tool with inherited stdio and wait for it.
pub fn run_tool<I, S>(store: &ManifestStore, name: &str, args: I) -> Result<ExitStatus, RunError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let binary = find_binary(store, name)?;
  debug!(name, path = %binary.display(), "running tool");

  tool_command(store.paths(), &binary, args)?
    .status()
    .map_err(|source| RunError::Spawn { program: binary, source })
}

/// Exit code to propagate for a finished child.
pub fn exit_code(status: ExitStatus) -> i32 {
  if let Some(code) = status.code() {
    return code;
  }
  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
      return 128 + signal;
    }
  }
  1
}
