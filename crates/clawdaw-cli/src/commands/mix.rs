//! Mix command implementation
//!
//! Compiles a project's mix spec into a processing plan.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

use clawdaw_backend_mix::{compile_project_mix, MixPlan};

use crate::input::load_project;

/// Run the mix command
///
/// # Arguments
/// * `project_path` - Project file to compile
/// * `out` - Optional path for the plan JSON
/// * `filtergraph` - Also print the renderer filtergraph
/// * `json_output` - Print the plan as JSON instead of a summary
///
/// # Returns
/// Exit code: 0 if the mix compiles, 1 otherwise
pub fn run(
    project_path: &str,
    out: Option<&str>,
    filtergraph: bool,
    json_output: bool,
) -> Result<ExitCode> {
    let loaded = load_project(Path::new(project_path))?;
    let plan = match compile_project_mix(&loaded.project) {
        Ok(plan) => plan,
        Err(errors) => {
            if json_output {
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "ok": false,
                        "errors": messages,
                    }))?
                );
            } else {
                println!("{} {}", "Compiling mix:".cyan().bold(), project_path);
                for error in &errors {
                    println!("  {} {}", "x".red(), error);
                }
                println!("{} ({} error(s))", "FAILED".red().bold(), errors.len());
            }
            return Ok(ExitCode::from(1));
        }
    };

    if let Some(out) = out {
        std::fs::write(out, serde_json::to_string_pretty(&plan)?)
            .with_context(|| format!("Failed to write plan: {}", out))?;
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_human(project_path, &plan, out);
    }
    if filtergraph {
        println!("{}", plan.to_filtergraph());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_human(project_path: &str, plan: &MixPlan, out: Option<&str>) {
    println!("{} {}", "Compiling mix:".cyan().bold(), project_path);
    let order: Vec<String> = plan.schedule.iter().map(|n| n.to_string()).collect();
    println!("{} {}", "Schedule:".dimmed(), order.join(" -> "));
    for track in &plan.tracks {
        println!(
            "  track {} '{}' -> {} ({} stage(s))",
            track.index,
            track.name,
            track.bus,
            track.stages.len()
        );
    }
    for (name, bus) in &plan.busses {
        println!(
            "  bus {} -> {} ({} stage(s))",
            name,
            bus.output.as_deref().unwrap_or("master"),
            bus.stages.len()
        );
    }
    println!("  master ({} stage(s))", plan.master.stages.len());
    if let Some(out) = out {
        println!("{} {}", "Plan:".dimmed(), out);
    }
    println!(
        "{} {} stage(s)",
        "SUCCESS".green().bold(),
        plan.stage_count()
    );
}
