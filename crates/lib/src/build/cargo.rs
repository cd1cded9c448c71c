//! [`Builder`] that drives `cargo install`.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use super::{BuildError, BuildRequest, Builder};

/// Lines of toolchain output kept in a build failure.
const FAILURE_TAIL_LINES: usize = 60;

/// Runs `cargo install --path <tree> --root <staging> --no-track`.
///
/// `CARGO_INSTALL_ROOT` is removed from the child environment and the install
/// root is always passed explicitly, so ambient configuration can never send
/// binaries anywhere but the staging directory.
#[derive(Debug, Clone)]
pub struct CargoBuilder {
  cargo: PathBuf,
  locked: bool,
  offline: bool,
}

impl Default for CargoBuilder {
  fn default() -> Self {
    Self::new("cargo")
  }
}

impl CargoBuilder {
  pub fn new(cargo: impl Into<PathBuf>) -> Self {
    Self {
      cargo: cargo.into(),
      locked: false,
      offline: false,
    }
  }

  /// Pass `--locked`.
  pub fn locked(mut self, locked: bool) -> Self {
    self.locked = locked;
    self
  }

  /// Pass `--offline`.
  pub fn offline(mut self, offline: bool) -> Self {
    self.offline = offline;
    self
  }

  fn command(&self, request: &BuildRequest<'_>) -> Command {
    let mut command = Command::new(&self.cargo);
    command
      .arg("install")
      .arg("--path")
      .arg(request.source_tree)
      .arg("--root")
      .arg(request.output_root)
      .arg("--no-track")
      .current_dir(request.source_tree)
      .env_remove("CARGO_INSTALL_ROOT")
      .env("CARGO_TARGET_DIR", request.target_dir);

    if self.locked {
      command.arg("--locked");
    }
    if self.offline {
      command.arg("--offline");
    }
    command
  }
}

impl Builder for CargoBuilder {
  fn build(&self, request: &BuildRequest<'_>) -> Result<(), BuildError> {
    let program = self.cargo.display().to_string();
    info!(cargo = %program, path = %request.source_tree.display(), "running cargo install");

    let output = self
      .command(request)
      .output()
      .map_err(|source| BuildError::Spawn {
        program: program.clone(),
        source,
      })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
      let status = match output.status.code() {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
      };
      let mut reason = format!("{} install terminated with {}", program, status);
      let tail = tail_lines(&stderr, FAILURE_TAIL_LINES);
      if !tail.is_empty() {
        reason.push('\n');
        reason.push_str(&tail);
      }
      return Err(BuildError::BuildFailed { reason });
    }

    if !stderr.trim().is_empty() {
      debug!(stderr = %stderr.trim(), "cargo output");
    }
    Ok(())
  }
}

fn tail_lines(text: &str, count: usize) -> String {
  let lines: Vec<&str> = text.trim_end().lines().collect();
  let start = lines.len().saturating_sub(count);
  lines[start..].join("\n")
}
