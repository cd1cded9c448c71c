//! Implementation of the `toolpin upgrade` command.

use anyhow::{Context, Result, bail};

use toolpin_lib::identity::normalize_source;
use toolpin_lib::sync::{SyncMode, SyncReport};

use super::{Settings, ensure_layout, finish_report, runtime};
use crate::output::print_info;

/// Move a declared tool to another revision (and optionally another fork),
/// then run its pipeline.
pub fn cmd_upgrade(settings: &Settings, tool: &str, rev: &str, fork: Option<&str>) -> Result<()> {
  let rev = rev.trim();
  if rev.is_empty() {
    bail!("A revision is required");
  }

  let planner = settings.planner();
  let paths = planner.store().paths();
  let fork = fork.map(|f| normalize_source(f, paths.base_dir()));

  let declaration = planner
    .store()
    .upgrade(tool, rev, fork)
    .with_context(|| format!("Failed to upgrade '{}'", tool))?;
  print_info(&format!("Upgrading {} to {}", declaration.identity, declaration.rev));

  ensure_layout(paths)?;
  let report = runtime()?.block_on(planner.run_one(declaration, SyncMode::Sync));
  finish_report(&SyncReport { tools: vec![report] }, settings.verbose)
}
