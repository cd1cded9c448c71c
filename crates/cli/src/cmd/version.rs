use toolpin_lib::consts::{APP_NAME, VERSION};

/// Print `toolpin v<version>`. Works outside any project.
pub fn cmd_version() {
  println!("{} {}", APP_NAME, VERSION);
}
