//! End-to-end tests driving the toolpin binary against throwaway local git
//! repositories. They need `git` and a Rust toolchain on PATH, so they are
//! ignored by default: `cargo test -p toolpin-cli -- --ignored`.

mod common;
mod pipeline_tests;
