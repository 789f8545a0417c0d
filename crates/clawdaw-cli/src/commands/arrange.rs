//! Arrange command implementation
//!
//! Applies an arrangement spec to a project file.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use clawdaw_backend_arrange::{apply_arrangement, load_arrange_spec};
use clawdaw_spec::hash::canonical_project_hash;
use clawdaw_spec::validation::migrate::to_json_pretty;

use crate::input::load_project;

#[derive(Debug, Serialize)]
struct ArrangeOutput {
    ok: bool,
    sections: usize,
    clips: usize,
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_hash: Option<String>,
}

/// Run the arrange command
///
/// The project is only written when the arrangement compiles cleanly.
///
/// # Returns
/// Exit code: 0 on success, 1 if any section or cue failed
pub fn run(
    project_path: &str,
    spec_path: &str,
    out: Option<&str>,
    json_output: bool,
) -> Result<ExitCode> {
    let mut project = load_project(Path::new(project_path))?.project;
    let spec = load_arrange_spec(Path::new(spec_path))
        .with_context(|| format!("Failed to load arrangement: {}", spec_path))?;

    let output = match apply_arrangement(&mut project, &spec) {
        Ok(compiled) => ArrangeOutput {
            ok: true,
            sections: compiled.sections.len(),
            clips: compiled.clip_count(),
            errors: Vec::new(),
            project_hash: canonical_project_hash(&project).ok(),
        },
        Err(errors) => ArrangeOutput {
            ok: false,
            sections: 0,
            clips: 0,
            errors: errors.iter().map(|e| e.to_string()).collect(),
            project_hash: None,
        },
    };

    if output.ok {
        if let Some(out) = out {
            std::fs::write(out, to_json_pretty(&project)?)
                .with_context(|| format!("Failed to write project: {}", out))?;
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} {} with {}", "Arranging:".cyan().bold(), project_path, spec_path);
        for error in &output.errors {
            println!("  {} {}", "x".red(), error);
        }
        if output.ok {
            println!(
                "{} {} section(s), {} clip(s)",
                "SUCCESS".green().bold(),
                output.sections,
                output.clips
            );
            if let Some(out) = out {
                println!("{} {}", "Wrote:".dimmed(), out);
            }
        } else {
            println!("{} ({} error(s))", "FAILED".red().bold(), output.errors.len());
        }
    }

    Ok(if output.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
