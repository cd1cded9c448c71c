mod add;
mod build;
mod clean;
mod remove;
mod run;
mod status;
mod sync;
mod upgrade;
mod version;

pub use add::cmd_add;
pub use build::cmd_build;
pub use clean::cmd_clean;
pub use remove::cmd_remove;
pub use run::cmd_do;
pub use status::cmd_status;
pub use sync::cmd_sync;
pub use upgrade::cmd_upgrade;
pub use version::cmd_version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use owo_colors::{OwoColorize, Stream};
use tracing::debug;

use toolpin_lib::build::CargoBuilder;
use toolpin_lib::project::ProjectPaths;
use toolpin_lib::sync::{SyncPlanner, SyncReport, ToolReport, ToolStatus};
use toolpin_lib::vcs::GixVcs;

use crate::output::{format_duration, print_error, print_info, print_success, print_warning, symbols};

/// Global options shared by every command.
pub struct Settings {
  pub base_dir: PathBuf,
  pub jobs: usize,
  pub cargo: PathBuf,
  pub locked: bool,
  pub offline: bool,
  pub verbose: bool,
}

impl Settings {
  pub fn paths(&self) -> ProjectPaths {
    ProjectPaths::discover(&self.base_dir)
  }

  /// Planner wired to git and cargo.
  pub fn planner(&self) -> SyncPlanner {
    let paths = self.paths();
    debug!(
      base_dir = %paths.base_dir().display(),
      cargo = %self.cargo.display(),
      locked = self.locked,
      offline = self.offline,
      "project"
    );
    let builder = CargoBuilder::new(&self.cargo)
      .locked(self.locked)
      .offline(self.offline);
    SyncPlanner::new(paths, Arc::new(GixVcs::new()), Arc::new(builder))
  }
}

/// Create `_tools/` before a command that installs anything.
pub fn ensure_layout(paths: &ProjectPaths) -> Result<()> {
  paths
    .ensure_layout()
    .with_context(|| format!("Failed to create {}", paths.tools_dir().display()))
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

/// Print one line per tool, then fail if any tool failed.
pub fn finish_report(report: &SyncReport, verbose: bool) -> Result<()> {
  for tool in &report.tools {
    print_tool(tool, verbose);
  }

  let failed = report.failures().count();
  if report.tools.len() > 1 {
    println!();
    print_info(&format!(
      "{} tools: {} installed, {} up to date, {} failed",
      report.tools.len(),
      report.installed_count(),
      report.up_to_date_count(),
      failed
    ));
  }

  if failed > 0 {
    bail!("{} of {} tools failed", failed, report.tools.len());
  }
  Ok(())
}

pub fn print_tool(tool: &ToolReport, verbose: bool) {
  let name = tool.identity.as_str();
  let name = name.if_supports_color(Stream::Stdout, |s| s.cyan());

  match &tool.status {
    ToolStatus::UpToDate { revision } => {
      print_success(&format!("{} {} ({}) up to date", name, tool.rev, revision.short()));
    }
    ToolStatus::Installed {
      revision,
      previous,
      binaries,
    } => {
      let change = match previous {
        Some(old) if old != revision => format!("{} {} {}", old.short(), symbols::ARROW, revision.short()),
        _ => revision.short().to_string(),
      };
      print_success(&format!(
        "{} {} ({}) installed [{}] in {}",
        name,
        tool.rev,
        change,
        binaries.join(", "),
        format_duration(tool.elapsed)
      ));
    }
    ToolStatus::Stale { revision, installed } => {
      let installed = installed.as_ref().map_or("not installed", |r| r.short());
      print_warning(&format!(
        "{} {} ({}) is stale: installed {}",
        tool.identity, tool.rev, revision.short(), installed
      ));
    }
    ToolStatus::Failed(err) => {
      print_error(&format!("{} {} failed ({}): {}", tool.identity, tool.rev, err.kind(), err));
    }
  }

  if verbose {
    let trace: Vec<_> = tool.trace.iter().map(|s| s.to_string()).collect();
    println!(
      "    {}",
      trace
        .join(&format!(" {} ", symbols::ARROW))
        .if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
}
