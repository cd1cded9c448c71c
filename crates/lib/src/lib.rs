//! toolpin-lib: per-project pinned developer tools
//!
//! This crate provides the pipeline behind the `toolpin` binary:
//! - `resolve`: revision specifiers to immutable commit ids
//! - `cache`: one source working copy per tool, guarded by a completion marker
//! - `manifest`: declarations (`tools.json`) and installed state (`_tools/manifest.json`)
//! - `build`: runs the toolchain on a checkout and collects binaries and legal files
//! - `install`: atomic placement into `_tools/bin`
//! - `sync`: per-tool state machine and bounded-parallel reconciliation

pub mod build;
pub mod cache;
pub mod consts;
pub mod identity;
pub mod install;
pub mod lock;
pub mod manifest;
pub mod project;
pub mod resolve;
pub mod revision;
pub mod run;
pub mod sync;
pub mod util;
pub mod vcs;
