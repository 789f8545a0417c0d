//! clawdaw End-to-End Test Infrastructure
//!
//! This crate provides integration tests for determinism-critical flows:
//!
//! - Scripts: strict and lenient runs, includes, dry runs
//! - **Determinism**: identical scripts give identical projects, note
//!   events, MIDI bytes and mix plans
//! - Persistence: save, reload and migration of project documents
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p clawdaw-tests
//! ```

pub mod determinism;
pub mod fixtures;

pub use determinism::{compute_hash, verify_determinism, DeterminismResult, DiffInfo};
pub use fixtures::{run_lenient, run_strict, Outcome, SONG_SCRIPT};
