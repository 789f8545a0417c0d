//! Validate command implementation
//!
//! Loads a project file, migrates it to the current schema and reports
//! every repair and structural finding.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use clawdaw_spec::hash::canonical_project_hash;
use clawdaw_spec::validation::migrate::MigrationEntry;
use clawdaw_spec::validation::references::{analyze_references, ReferenceReport};
use clawdaw_spec::validation::validate_project;
use clawdaw_spec::{DerivedFacts, ValidationError, ValidationWarning};

use crate::input::load_project;

#[derive(Debug, Serialize)]
struct Finding {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl From<&ValidationError> for Finding {
    fn from(e: &ValidationError) -> Self {
        Finding {
            code: e.code.code(),
            message: e.message.clone(),
            path: e.path.clone(),
        }
    }
}

impl From<&ValidationWarning> for Finding {
    fn from(w: &ValidationWarning) -> Self {
        Finding {
            code: w.code.code(),
            message: w.message.clone(),
            path: w.path.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    ok: bool,
    path: String,
    from_version: u32,
    to_version: u32,
    migration: Vec<MigrationEntry>,
    errors: Vec<Finding>,
    warnings: Vec<Finding>,
    references: ReferenceReport,
    derived: DerivedFacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_hash: Option<String>,
}

fn build(project_path: &str) -> Result<ValidateOutput> {
    let loaded = load_project(Path::new(project_path))?;
    let result = validate_project(&loaded.project);
    Ok(ValidateOutput {
        ok: result.is_ok(),
        path: project_path.to_string(),
        from_version: loaded.migration.from_version,
        to_version: loaded.migration.to_version,
        migration: loaded.migration.entries.clone(),
        errors: result.errors.iter().map(Finding::from).collect(),
        warnings: result.warnings.iter().map(Finding::from).collect(),
        references: analyze_references(&loaded.project),
        derived: DerivedFacts::of(&loaded.project),
        project_hash: canonical_project_hash(&loaded.project).ok(),
    })
}

/// Run the validate command
///
/// # Returns
/// Exit code: 0 if valid after migration, 1 otherwise
pub fn run(project_path: &str, json_output: bool) -> Result<ExitCode> {
    let output = build(project_path)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_human(&output);
    }
    Ok(if output.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_human(output: &ValidateOutput) {
    println!("{} {}", "Validating:".cyan().bold(), output.path);
    if output.from_version != output.to_version {
        println!(
            "{} schema {} -> {}",
            "Migrated:".dimmed(),
            output.from_version,
            output.to_version
        );
    }
    for entry in &output.migration {
        println!(
            "  {} [{}] {}: {} -> {} ({})",
            "~".blue(),
            serde_json::to_value(entry.action)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            entry.field,
            entry.old,
            entry.new,
            entry.reason
        );
    }
    for warning in &output.warnings {
        println!("  {} {}: {}", "!".yellow(), warning.code, warning.message);
    }
    for missing in &output.references.missing {
        println!(
            "  {} track {} clip {} references missing pattern '{}'",
            "!".yellow(),
            missing.track,
            missing.clip,
            missing.pattern
        );
    }
    for error in &output.errors {
        let at = error
            .path
            .as_ref()
            .map(|p| format!(" (at {})", p))
            .unwrap_or_default();
        println!("  {} {}: {}{}", "x".red(), error.code, error.message, at.dimmed());
    }
    println!(
        "{} {} ticks, {:.2}s, {:.2} bars",
        "Song:".dimmed(),
        output.derived.song_length_ticks,
        output.derived.song_length_seconds,
        output.derived.song_bars_estimate
    );
    if let Some(hash) = &output.project_hash {
        println!("{} {}", "Hash:".dimmed(), &hash[..16]);
    }
    if output.ok {
        println!("{}", "SUCCESS".green().bold());
    } else {
        println!("{} ({} error(s))", "FAILED".red().bold(), output.errors.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdaw_spec::validation::migrate::to_json_pretty;
    use clawdaw_spec::{Clip, Project, TrackMode};

    #[test]
    fn reports_repairs_of_dangling_clips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut project = Project::new("demo", 120.0);
        let t = project.add_track("Keys", TrackMode::default()).unwrap();
        project.new_pattern(t, "main", 1920).unwrap();
        project.tracks[t].clips.push(Clip::new("gone", 0, 1));
        std::fs::write(&path, to_json_pretty(&project).unwrap()).unwrap();

        let output = build(path.to_str().unwrap()).unwrap();
        assert!(output.ok);
        assert!(output.migration.iter().any(|e| e.field.contains("clips")));
        assert_eq!(output.derived.song_length_ticks, 0);
    }
}
