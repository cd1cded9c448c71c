//! Implementation of the `toolpin do` command.

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Result;

use toolpin_lib::manifest::ManifestStore;
use toolpin_lib::run::{exit_code, run_tool};

use super::Settings;

/// Run an installed tool and exit with its exit code.
pub fn cmd_do(settings: &Settings, tool: &str, args: &[OsString]) -> Result<ExitCode> {
  let store = ManifestStore::new(settings.paths());
  let status = run_tool(&store, tool, args)?;

  let code = exit_code(status);
  Ok(ExitCode::from(u8::try_from(code & 0xff).unwrap_or(1)))
}
