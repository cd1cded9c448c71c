//! Legal-file discovery.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Recognized names, compared case-insensitively.
pub const LEGAL_FILE_NAMES: &[&str] = &[
  "LICENSE",
  "LICENSE.md",
  "LICENSE.txt",
  "LICENSE-MIT",
  "LICENSE-APACHE",
  "LICENCE",
  "COPYING",
  "COPYING.txt",
  "NOTICE",
  "NOTICE.txt",
  "PATENTS",
  "AUTHORS",
  "UNLICENSE",
  "COPYRIGHT",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalFile {
  pub source: PathBuf,
  /// Path relative to the checkout root.
  pub relative: PathBuf,
}

fn is_legal_name(name: &str) -> bool {
  LEGAL_FILE_NAMES.iter().any(|known| known.eq_ignore_ascii_case(name))
}

/// Find legal files in `root` and its immediate, non-hidden subdirectories.
pub fn find_legal_files(root: &Path) -> io::Result<Vec<LegalFile>> {
  let mut found = Vec::new();
  scan_dir(root, Path::new(""), &mut found)?;

  let mut subdirs = Vec::new();
  for entry in fs::read_dir(root)? {
    let entry = entry?;
    let name = entry.file_name();
    if entry.file_type()?.is_dir() && !name.to_string_lossy().starts_with('.') {
      subdirs.push(name);
    }
  }
  subdirs.sort();

  for name in subdirs {
    scan_dir(&root.join(&name), Path::new(&name), &mut found)?;
  }
  Ok(found)
}

fn scan_dir(dir: &Path, prefix: &Path, found: &mut Vec<LegalFile>) -> io::Result<()> {
  let mut matches = Vec::new();
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let name = entry.file_name();
    if entry.file_type()?.is_file() && is_legal_name(&name.to_string_lossy()) {
      matches.push(name);
    }
  }
  matches.sort();

  found.extend(matches.into_iter().map(|name| LegalFile {
    source: dir.join(&name),
    relative: prefix.join(&name),
  }));
  Ok(())
}
