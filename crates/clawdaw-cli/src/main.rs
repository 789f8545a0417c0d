//! clawdaw CLI - headless music production from text scripts
//!
//! This binary runs command scripts against a project and exposes the
//! project tooling (validation, mix and arrangement compilation, hashing).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use clawdaw_cli::commands;
use clawdaw_cli::config::{EngineConfig, RendererConfig};

/// clawdaw - headless, script-driven music production
#[derive(Parser)]
#[command(name = "clawdaw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command script
    Run {
        /// Path to the script
        script: String,

        /// Stop at the first error
        #[arg(long)]
        strict: bool,

        /// Apply everything except renders and exports
        #[arg(long)]
        dry_run: bool,

        /// Output the run report as JSON (no colored output)
        #[arg(long)]
        json: bool,

        /// SoundFont passed to the renderer
        #[arg(long)]
        soundfont: Option<PathBuf>,

        /// Renderer command line, e.g. "clawdaw-render --fast"
        #[arg(long)]
        renderer: Option<String>,

        /// Renderer timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Directory for default export paths
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Validate and migrate a project file
    Validate {
        /// Path to the project JSON
        project: String,

        /// Output machine-readable JSON diagnostics (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Compile a project's mix into a processing plan
    Mix {
        /// Path to the project JSON
        project: String,

        /// Write the plan JSON here
        #[arg(short, long)]
        out: Option<String>,

        /// Print the renderer filtergraph
        #[arg(long)]
        filtergraph: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply an arrangement spec (JSON or YAML) to a project
    Arrange {
        /// Path to the project JSON
        project: String,

        /// Path to the arrangement spec
        spec: String,

        /// Write the arranged project here
        #[arg(short, long)]
        out: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical hash of a project
    Hash {
        /// Path to the project JSON
        project: String,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

struct RunOverrides {
    soundfont: Option<PathBuf>,
    renderer: Option<String>,
    timeout: Option<u64>,
    out_dir: Option<PathBuf>,
}

/// File, then environment, then flags.
fn engine_config(overrides: RunOverrides) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::load().context("Failed to load engine config")?;
    if let Some(soundfont) = overrides.soundfont {
        config.soundfont_path = Some(soundfont);
    }
    if let Some(line) = overrides.renderer {
        config.renderer = Some(
            RendererConfig::parse_command_line(&line)
                .with_context(|| format!("Invalid renderer command line: {:?}", line))?,
        );
    }
    if let Some(timeout) = overrides.timeout {
        anyhow::ensure!(timeout > 0, "render timeout must be at least one second");
        config.render_timeout_secs = timeout;
    }
    if let Some(out_dir) = overrides.out_dir {
        config.out_dir = out_dir;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            script,
            strict,
            dry_run,
            json,
            soundfont,
            renderer,
            timeout,
            out_dir,
        } => engine_config(RunOverrides {
            soundfont,
            renderer,
            timeout,
            out_dir,
        })
        .and_then(|config| commands::run::run(&script, strict, dry_run, json, config)),
        Commands::Validate { project, json } => commands::validate::run(&project, json),
        Commands::Mix {
            project,
            out,
            filtergraph,
            json,
        } => commands::mix::run(&project, out.as_deref(), filtergraph, json),
        Commands::Arrange {
            project,
            spec,
            out,
            json,
        } => commands::arrange::run(&project, &spec, out.as_deref(), json),
        Commands::Hash { project, json } => commands::hash::run(&project, json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "clawdaw",
            "run",
            "song.txt",
            "--strict",
            "--dry-run",
            "--timeout",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                script,
                strict,
                dry_run,
                json,
                timeout,
                ..
            } => {
                assert_eq!(script, "song.txt");
                assert!(strict);
                assert!(dry_run);
                assert!(!json);
                assert_eq!(timeout, Some(30));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parses_mix_with_out() {
        let cli = Cli::try_parse_from(["clawdaw", "mix", "p.json", "-o", "plan.json", "--json"]).unwrap();
        match cli.command {
            Commands::Mix {
                project, out, json, ..
            } => {
                assert_eq!(project, "p.json");
                assert_eq!(out.as_deref(), Some("plan.json"));
                assert!(json);
            }
            _ => panic!("expected mix command"),
        }
    }

    #[test]
    fn test_cli_parses_arrange() {
        let cli = Cli::try_parse_from(["clawdaw", "arrange", "p.json", "song.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::Arrange { ref spec, .. } if spec == "song.yaml"));
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["clawdaw", "hash", "p.json", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["clawdaw"]).is_err());
    }
}
