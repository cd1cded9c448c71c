//! Shared test helpers for CLI integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the project and the
/// repositories tools are fetched from.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("project")).unwrap();
    Self { temp }
  }

  /// Project base directory.
  pub fn project(&self) -> PathBuf {
    let p = self.temp.path().join("project");
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn tools_dir(&self) -> PathBuf {
    self.project().join("_tools")
  }

  /// Get a pre-configured Command for the toolpin binary.
  ///
  /// Runs inside the project and clears every `TOOLPIN_*` variable so the
  /// caller's environment cannot leak into the test.
  pub fn toolpin_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("toolpin");
    cmd.current_dir(self.project());
    for var in ["TOOLPIN_BASE_DIR", "TOOLPIN_JOBS", "TOOLPIN_CARGO", "TOOLPIN_LOCKED", "TOOLPIN_OFFLINE"] {
      cmd.env_remove(var);
    }
    cmd.env("TOOLPIN_OFFLINE", "true");
    cmd
  }

  /// Create a git repository holding a binary crate named `name`.
  pub fn tool_repo(&self, name: &str) -> ToolRepo {
    let dir = self.temp.path().join("repos").join(name);
    fs::create_dir_all(dir.join("src")).unwrap();
    let dir = dunce::canonicalize(&dir).unwrap();

    fs::write(dir.join("LICENSE"), "MIT License\n").unwrap();
    fs::write(
      dir.join("src/main.rs"),
      "fn main() {\n  println!(\"{} {}\", env!(\"CARGO_PKG_NAME\"), env!(\"CARGO_PKG_VERSION\"));\n}\n",
    )
    .unwrap();

    let repo = ToolRepo {
      dir,
      name: name.to_string(),
    };
    repo.git(&["init", "--quiet", "--initial-branch=main"]);
    repo
  }
}

/// A local repository standing in for a remote tool source.
pub struct ToolRepo {
  pub dir: PathBuf,
  pub name: String,
}

impl ToolRepo {
  pub fn location(&self) -> String {
    self.dir.to_string_lossy().into_owned()
  }

  /// Commit the crate at `version` and tag it `v<version>`.
  pub fn release(&self, version: &str) {
    self.write_manifest(version);
    self.commit_and_tag(&format!("v{}", version));
  }

  /// Commit a crate that does not compile and tag it.
  pub fn release_broken(&self, tag: &str) {
    fs::write(self.dir.join("src/main.rs"), "fn main() { undefined_function(); }\n").unwrap();
    self.commit_and_tag(tag);
  }

  fn write_manifest(&self, version: &str) {
    fs::write(
      self.dir.join("Cargo.toml"),
      format!(
        "[package]\nname = \"{}\"\nversion = \"{}\"\nedition = \"2021\"\n\n[workspace]\n",
        self.name, version
      ),
    )
    .unwrap();
  }

  fn commit_and_tag(&self, tag: &str) {
    self.git(&["add", "--all"]);
    self.git(&["commit", "--quiet", "--message", tag]);
    self.git(&["tag", tag]);
  }

  pub fn git(&self, args: &[&str]) {
    run_git(&self.dir, args);
  }
}

fn run_git(dir: &Path, args: &[&str]) {
  let status = process::Command::new("git")
    .args(args)
    .current_dir(dir)
    .env("GIT_AUTHOR_NAME", "toolpin")
    .env("GIT_AUTHOR_EMAIL", "toolpin@example.com")
    .env("GIT_COMMITTER_NAME", "toolpin")
    .env("GIT_COMMITTER_EMAIL", "toolpin@example.com")
    .env("GIT_CONFIG_NOSYSTEM", "1")
    .status()
    .unwrap_or_else(|e| panic!("failed to run git {:?}: {}", args, e));
  assert!(status.success(), "git {:?} failed in {}", args, dir.display());
}
