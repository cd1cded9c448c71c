mod cmd;
mod output;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use toolpin_lib::consts::DEFAULT_JOBS;

use crate::cmd::Settings;
use crate::output::{OutputFormat, print_error};

/// toolpin - per-project pinned developer tools
#[derive(Parser)]
#[command(name = "toolpin")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project directory holding tools.json and _tools/
  #[arg(long, global = true, env = "TOOLPIN_BASE_DIR", default_value = ".")]
  base_dir: PathBuf,

  /// Maximum number of tools processed in parallel
  #[arg(short, long, global = true, env = "TOOLPIN_JOBS", default_value_t = DEFAULT_JOBS)]
  jobs: usize,

  /// Cargo executable used to build tools
  #[arg(long, global = true, env = "TOOLPIN_CARGO", default_value = "cargo")]
  cargo: PathBuf,

  /// Build with the tool's Cargo.lock (`cargo install --locked`)
  #[arg(long, global = true, env = "TOOLPIN_LOCKED")]
  locked: bool,

  /// Build without network access (`cargo install --offline`)
  #[arg(long, global = true, env = "TOOLPIN_OFFLINE")]
  offline: bool,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Declare a tool and install it
  Add {
    /// Git repository: URL, scp-style address, local path or host/org/repo
    source: String,

    /// Tag, branch or full commit id
    rev: String,

    /// Fetch the source from this fork instead
    #[arg(short, long)]
    fork: Option<String>,

    /// Crate directory inside the repository
    #[arg(long)]
    path: Option<String>,
  },

  /// Change the revision of a declared tool and install it
  Upgrade {
    /// Tool identity or short name
    tool: String,

    /// Tag, branch or full commit id
    rev: String,

    /// Switch the fork the source is fetched from
    #[arg(short, long)]
    fork: Option<String>,
  },

  /// Install every declared tool that is missing or stale
  Sync,

  /// Rebuild and reinstall every declared tool from the source cache
  Build,

  /// Run an installed tool with _tools/bin on PATH
  Do {
    /// Binary or tool name
    tool: String,

    /// Arguments passed to the tool
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
  },

  /// Reserved; does nothing
  Clean,

  /// Print the toolpin version
  Version,

  /// Drop a tool's declaration, binaries and legal files
  Remove {
    /// Tool identity or short name
    tool: String,
  },

  /// Report which tools are up to date without installing anything
  Status {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  // Logs go to stderr so stdout stays clean for `do` and `version`.
  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  let settings = Settings {
    base_dir: cli.base_dir,
    jobs: cli.jobs,
    cargo: cli.cargo,
    locked: cli.locked,
    offline: cli.offline,
    verbose: cli.verbose,
  };

  match cli.command {
    Commands::Add { source, rev, fork, path } => cmd::cmd_add(&settings, &source, &rev, fork.as_deref(), path)?,
    Commands::Upgrade { tool, rev, fork } => cmd::cmd_upgrade(&settings, &tool, &rev, fork.as_deref())?,
    Commands::Sync => cmd::cmd_sync(&settings)?,
    Commands::Build => cmd::cmd_build(&settings)?,
    Commands::Do { tool, args } => return cmd::cmd_do(&settings, &tool, &args),
    Commands::Clean => cmd::cmd_clean(),
    Commands::Version => cmd::cmd_version(),
    Commands::Remove { tool } => cmd::cmd_remove(&settings, &tool)?,
    Commands::Status { output } => cmd::cmd_status(&settings, output)?,
  }
  Ok(ExitCode::SUCCESS)
}
