//! Hashing for source-tree fingerprints.
//!
//! A fingerprint identifies the exact content of a checked-out source tree. It
//! is recorded in the cache marker when a checkout completes and copied into
//! the installed record after a successful install, so staleness can be
//! detected without network access.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

/// Full 64-character lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum TreeHashError {
  #[error("failed to walk '{}': {message}", path.display())]
  Walk { path: PathBuf, message: String },

  #[error("failed to read '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Fingerprint a directory tree.
///
/// Covers relative paths, file contents, the executable bit (unix) and
/// symlink targets. Timestamps and ownership are ignored. Entries whose file
/// name is in `exclude` are skipped together with everything beneath them.
pub fn hash_tree(root: &Path, exclude: &[&str]) -> Result<ContentHash, TreeHashError> {
  let walker = WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !e.file_name().to_str().is_some_and(|name| exclude.contains(&name)));

  let mut hasher = Sha256::new();

  for entry in walker {
    let entry = entry.map_err(|e| TreeHashError::Walk {
      path: root.to_path_buf(),
      message: e.to_string(),
    })?;
    if entry.depth() == 0 {
      continue;
    }

    let path = entry.path();
    // Forward slashes keep fingerprints identical across platforms.
    let rel = path
      .strip_prefix(root)
      .unwrap_or(path)
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");

    let file_type = entry.file_type();
    let line = if file_type.is_symlink() {
      let target = fs::read_link(path).map_err(|source| TreeHashError::Read {
        path: path.to_path_buf(),
        source,
      })?;
      format!("L:{}:{}", rel, hash_bytes(target.to_string_lossy().as_bytes()))
    } else if file_type.is_dir() {
      format!("D:{}", rel)
    } else if file_type.is_file() {
      let mode = if is_executable(path) { "x" } else { "-" };
      format!("F:{}:{}:{}", rel, mode, hash_file(path)?)
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, TreeHashError> {
  let read_err = |source| TreeHashError::Read {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  fs::metadata(path).map(|m| m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
  false
}
