//! Status command implementation.
//!
//! Dry-runs the pipeline for every declared tool and reports whether the
//! installed binaries match what the declarations resolve to.

use anyhow::{Context, Result, bail};
use serde_json::json;

use toolpin_lib::manifest::InstalledState;
use toolpin_lib::sync::{SyncMode, SyncOptions, SyncReport, ToolStatus};

use super::{Settings, print_tool, runtime};
use crate::output::{OutputFormat, format_timestamp, print_info, print_json, print_stat, truncate_hash};

pub fn cmd_status(settings: &Settings, output: OutputFormat) -> Result<()> {
  let planner = settings.planner();
  let (declarations, installed) = planner.store().load().context("Failed to load project state")?;

  if declarations.is_empty() {
    if output.is_json() {
      print_json(&json!({ "tools": [] }))?;
    } else {
      print_info("No tools declared. Run 'toolpin add <source> <rev>' to declare one.");
    }
    return Ok(());
  }

  let options = SyncOptions {
    mode: SyncMode::DryRun,
    jobs: settings.jobs,
  };
  let report = runtime()?
    .block_on(planner.run_all(options))
    .context("Status check failed")?;

  if output.is_json() {
    print_json(&status_json(&report, &installed))?;
  } else {
    for tool in &report.tools {
      print_tool(tool, settings.verbose);
      if settings.verbose
        && let Some(record) = installed.get(&tool.identity)
      {
        print_stat("Installed", &format_timestamp(record.installed_at));
        print_stat("Binaries", &record.binaries.join(", "));
        print_stat("Fingerprint", truncate_hash(&record.fingerprint.0));
      }
    }
  }

  let failed = report.failures().count();
  if failed > 0 {
    bail!("{} of {} tools could not be checked", failed, report.tools.len());
  }
  Ok(())
}

fn status_json(report: &SyncReport, installed: &InstalledState) -> serde_json::Value {
  let tools: Vec<_> = report
    .tools
    .iter()
    .map(|tool| {
      let (state, revision, error) = match &tool.status {
        ToolStatus::UpToDate { revision } => ("up-to-date", Some(revision.as_str()), None),
        ToolStatus::Installed { revision, .. } => ("installed", Some(revision.as_str()), None),
        ToolStatus::Stale { revision, .. } => ("stale", Some(revision.as_str()), None),
        ToolStatus::Failed(err) => ("failed", None, Some(json!({ "kind": err.kind(), "message": err.to_string() }))),
      };
      let record = installed.get(&tool.identity).map(|r| {
        json!({
          "revision": r.revision.as_str(),
          "installedAt": format_timestamp(r.installed_at),
          "binaries": r.binaries,
        })
      });
      json!({
        "identity": tool.identity.as_str(),
        "rev": tool.rev,
        "status": state,
        "revision": revision,
        "installed": record,
        "error": error,
      })
    })
    .collect();

  json!({ "tools": tools })
}
