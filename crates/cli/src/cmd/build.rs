//! Implementation of the `toolpin build` command.

use anyhow::Result;

use toolpin_lib::sync::SyncMode;

use super::Settings;
use super::sync::run_pipeline;

/// Rebuild and reinstall every declared tool.
///
/// A verified source cache entry is built as-is, so a project whose
/// `_tools/bin` and `_tools/manifest.json` were deleted recovers without
/// network access. Tools with no usable cache entry are fetched first.
pub fn cmd_build(settings: &Settings) -> Result<()> {
  run_pipeline(settings, SyncMode::Build)
}
