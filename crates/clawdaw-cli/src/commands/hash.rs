//! Hash command implementation
//!
//! Prints the canonical hash of a project file.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use clawdaw_spec::hash::canonical_project_hash;

use crate::input::load_project;

#[derive(Debug, Serialize)]
struct HashOutput<'a> {
    path: &'a str,
    project_hash: String,
    source_hash: String,
    migrated: bool,
}

/// Run the hash command
///
/// The hash covers the project after migration, so a legacy file and its
/// migrated form hash the same.
pub fn run(project_path: &str, json_output: bool) -> Result<ExitCode> {
    let loaded = load_project(Path::new(project_path))?;
    let project_hash = canonical_project_hash(&loaded.project)
        .with_context(|| format!("Failed to hash project: {}", project_path))?;

    if json_output {
        let output = HashOutput {
            path: project_path,
            project_hash,
            source_hash: loaded.source_hash,
            migrated: !loaded.migration.is_clean(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", project_hash);
        if !loaded.migration.is_clean() {
            eprintln!(
                "{} hash of the migrated project ({} change(s))",
                "!".yellow(),
                loaded.migration.entries.len()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
