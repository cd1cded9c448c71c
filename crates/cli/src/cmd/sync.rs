//! Implementation of the `toolpin sync` command.

use anyhow::{Context, Result};

use toolpin_lib::sync::{SyncMode, SyncOptions};

use super::{Settings, ensure_layout, finish_report, runtime};
use crate::output::print_info;

/// Bring every declared tool to its declared revision.
///
/// Tools already installed at the resolved revision are skipped without
/// touching the network for fixed revisions. Exits non-zero when any tool
/// failed; the others still complete.
pub fn cmd_sync(settings: &Settings) -> Result<()> {
  run_pipeline(settings, SyncMode::Sync)
}

pub(super) fn run_pipeline(settings: &Settings, mode: SyncMode) -> Result<()> {
  let planner = settings.planner();
  let declarations = planner.store().load_declarations().context("Failed to load declarations")?;
  if declarations.is_empty() {
    print_info("No tools declared. Run 'toolpin add <source> <rev>' to declare one.");
    return Ok(());
  }

  ensure_layout(planner.store().paths())?;
  let options = SyncOptions {
    mode,
    jobs: settings.jobs,
  };
  let report = runtime()?
    .block_on(planner.run_all(options))
    .context("Sync failed")?;

  finish_report(&report, settings.verbose)
}
