//! Implementation of the `toolpin clean` command.

use crate::output::print_info;

/// Accepted for compatibility; removes nothing.
pub fn cmd_clean() {
  print_info("Nothing to clean");
}
