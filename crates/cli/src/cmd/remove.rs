//! Implementation of the `toolpin remove` command.

use anyhow::{Context, Result};

use toolpin_lib::install::Installer;

use super::Settings;
use crate::output::{print_stat, print_success};

/// Drop a tool's declaration and installed record, then delete its binaries
/// and legal files. The source cache slot is kept for a later re-add.
pub fn cmd_remove(settings: &Settings, tool: &str) -> Result<()> {
  let planner = settings.planner();
  let (declaration, record) = planner
    .store()
    .remove(tool)
    .with_context(|| format!("Failed to remove '{}'", tool))?;

  if let Some(record) = &record {
    let others = planner
      .store()
      .load_installed()
      .context("Failed to read installed tools")?;
    Installer::new(planner.store().paths().clone())
      .uninstall(&declaration.identity, record, &others)
      .with_context(|| format!("Failed to uninstall {}", declaration.identity))?;
  }

  print_success(&format!("Removed {}", declaration.identity));
  if let Some(record) = record {
    print_stat("Binaries", &record.binaries.join(", "));
  }
  Ok(())
}
