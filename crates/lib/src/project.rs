//! Project-local directory layout.
//!
//! Everything toolpin writes lives under the project's base directory:
//!
//! ```text
//! <base>/
//!   tools.json              # declarations
//!   _tools/
//!     manifest.json         # installed-state record
//!     src/<identity>/       # source cache slots
//!     bin/                  # installed binaries
//!     legal/<identity>/     # preserved license files
//!     target/<slot>/        # per-tool cargo target directories
//!     tmp/                  # clone and build staging
//!     .locks/               # lock files
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::{DECLARATIONS_FILENAME, INSTALLED_FILENAME, TOOLS_DIR_NAME};
use crate::identity::ToolIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
  base_dir: PathBuf,
}

impl ProjectPaths {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
    }
  }

  /// Resolve `base_dir` to an absolute path when it exists.
  ///
  /// A missing base directory is kept as given; commands that need it will
  /// create it on first write.
  pub fn discover(base_dir: &Path) -> Self {
    let base = dunce::canonicalize(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());
    Self::new(base)
  }

  pub fn base_dir(&self) -> &Path {
    &self.base_dir
  }

  pub fn declarations_file(&self) -> PathBuf {
    self.base_dir.join(DECLARATIONS_FILENAME)
  }

  pub fn tools_dir(&self) -> PathBuf {
    self.base_dir.join(TOOLS_DIR_NAME)
  }

  pub fn installed_file(&self) -> PathBuf {
    self.tools_dir().join(INSTALLED_FILENAME)
  }

  pub fn src_dir(&self) -> PathBuf {
    self.tools_dir().join("src")
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.tools_dir().join("bin")
  }

  pub fn legal_dir(&self) -> PathBuf {
    self.tools_dir().join("legal")
  }

  pub fn target_dir(&self) -> PathBuf {
    self.tools_dir().join("target")
  }

  pub fn tmp_dir(&self) -> PathBuf {
    self.tools_dir().join("tmp")
  }

  pub fn locks_dir(&self) -> PathBuf {
    self.tools_dir().join(".locks")
  }

  /// Source slot for a tool. Keyed by identity only, never by fork.
  pub fn slot_dir(&self, identity: &ToolIdentity) -> PathBuf {
    self.src_dir().join(identity.as_relative_path())
  }

  pub fn tool_legal_dir(&self, identity: &ToolIdentity) -> PathBuf {
    self.legal_dir().join(identity.as_relative_path())
  }

  pub fn tool_target_dir(&self, identity: &ToolIdentity) -> PathBuf {
    self.target_dir().join(identity.slot_label())
  }

  pub fn tool_lock_file(&self, identity: &ToolIdentity) -> PathBuf {
    self.locks_dir().join(format!("{}.lock", identity.slot_label()))
  }

  pub fn manifest_lock_file(&self) -> PathBuf {
    self.locks_dir().join("manifest.lock")
  }

  pub fn binary_path(&self, name: &str) -> PathBuf {
    self.bin_dir().join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
  }

  /// Create the directories the pipeline writes into.
  pub fn ensure_layout(&self) -> io::Result<()> {
    for dir in [
      self.src_dir(),
      self.bin_dir(),
      self.legal_dir(),
      self.target_dir(),
      self.tmp_dir(),
      self.locks_dir(),
    ] {
      fs::create_dir_all(&dir)?;
    }
    Ok(())
  }
}
