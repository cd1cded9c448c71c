//! Names and file-layout constants shared across the crate.

pub const APP_NAME: &str = "toolpin";

/// Version reported by `toolpin version`.
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Declarations file, relative to the base directory.
pub const DECLARATIONS_FILENAME: &str = "tools.json";

/// Project-local root for everything toolpin writes.
pub const TOOLS_DIR_NAME: &str = "_tools";

/// Installed-state record, relative to the tools directory.
pub const INSTALLED_FILENAME: &str = "manifest.json";

/// Cache entry marker, stored inside each source slot.
pub const CACHE_MARKER_FILENAME: &str = ".toolpin-cache.json";

/// Length of the hash suffix used in slot labels (`<name>-<hash>`).
pub const SLOT_HASH_LEN: usize = 8;

/// Default number of tool pipelines run concurrently.
pub const DEFAULT_JOBS: usize = 4;
