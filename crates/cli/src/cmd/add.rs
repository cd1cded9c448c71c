//! Implementation of the `toolpin add` command.

use anyhow::{Context, Result, bail};

use toolpin_lib::identity::{ToolIdentity, normalize_source};
use toolpin_lib::manifest::{AddOutcome, ToolDeclaration};
use toolpin_lib::sync::{SyncMode, SyncReport};

use super::{Settings, ensure_layout, finish_report, runtime};
use crate::output::print_info;

/// Declare a tool (or update its declaration) and run its pipeline.
///
/// The identity is derived from `source`, so re-adding the same repository at
/// another revision updates the existing entry. A fork only changes where the
/// source is fetched from.
pub fn cmd_add(settings: &Settings, source: &str, rev: &str, fork: Option<&str>, path: Option<String>) -> Result<()> {
  let rev = rev.trim();
  if rev.is_empty() {
    bail!("A revision is required");
  }

  let planner = settings.planner();
  let paths = planner.store().paths();
  let location = normalize_source(source, paths.base_dir());
  let identity = ToolIdentity::from_location(&location).with_context(|| format!("Invalid source '{}'", source))?;

  let declaration = ToolDeclaration {
    identity,
    source: location,
    fork: fork.map(|f| normalize_source(f, paths.base_dir())),
    rev: rev.to_string(),
    path,
  };

  let outcome = planner
    .store()
    .add_or_update(declaration.clone())
    .context("Failed to save declaration")?;
  match outcome {
    AddOutcome::Added => print_info(&format!("Declared {} at {}", declaration.identity, declaration.rev)),
    AddOutcome::Updated => print_info(&format!("Updated {} to {}", declaration.identity, declaration.rev)),
    AddOutcome::Unchanged => print_info(&format!("{} is already declared at {}", declaration.identity, declaration.rev)),
  }

  ensure_layout(paths)?;
  let report = runtime()?.block_on(planner.run_one(declaration, SyncMode::Sync));
  finish_report(&SyncReport { tools: vec![report] }, settings.verbose)
}
