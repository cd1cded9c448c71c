//! Shared utilities.
//!
//! Hashing, atomic file writes and the test doubles used by the pipeline tests.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
