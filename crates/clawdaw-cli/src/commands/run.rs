//! Run command implementation
//!
//! Executes a script file and reports what it did.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

use crate::config::EngineConfig;
use crate::script::{Interpreter, RunOptions, RunReport, RunState, Session};

/// Run the run command
///
/// `strict` is combined with the configured default; either one makes the
/// run stop at its first error.
///
/// # Returns
/// Exit code: 0 when the run ends ready, 1 when it failed or was cancelled
pub fn run(
    script_path: &str,
    strict: bool,
    dry_run: bool,
    json_output: bool,
    config: EngineConfig,
) -> Result<ExitCode> {
    let options = RunOptions {
        strict: strict || config.strict,
        dry_run,
    };
    let mut interpreter = Interpreter::new(Session::new(config), options);
    if !json_output {
        println!("{} {}", "Running:".cyan().bold(), script_path);
        if dry_run {
            println!("{}", "dry run: exports are skipped".dimmed());
        }
    }

    let report = interpreter.run_file(Path::new(script_path))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human(&report);
    }
    Ok(if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_human(report: &RunReport) {
    for line in &report.output {
        println!("  {}", line.dimmed());
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }

    let executed = if report.suppressed > 0 {
        format!(
            "{} command(s), {} export(s) skipped",
            report.commands_executed, report.suppressed
        )
    } else {
        format!("{} command(s)", report.commands_executed)
    };
    println!("{} {}", "Executed:".dimmed(), executed);
    if let Some(derived) = &report.derived {
        println!(
            "{} {} ticks, {:.2}s, {:.2} bars",
            "Song:".dimmed(),
            derived.song_length_ticks,
            derived.song_length_seconds,
            derived.song_bars_estimate
        );
    }
    if let Some(hash) = &report.project_hash {
        println!("{} {}", "Hash:".dimmed(), &hash[..16]);
    }

    match &report.state {
        RunState::Failed {
            file,
            line,
            text,
            code,
            message,
            ..
        } => {
            let at = match file {
                Some(f) => format!("{}:{}", f, line),
                None => format!("line {}", line),
            };
            println!(
                "{} {} [{}] {}: {}",
                "FAILED".red().bold(),
                at,
                code,
                text,
                message
            );
        }
        RunState::Cancelled { line } => {
            println!("{} before line {}", "CANCELLED".yellow().bold(), line);
        }
        RunState::Ready | RunState::Executing { .. } => {
            println!("{}", "SUCCESS".green().bold());
        }
    }
}
