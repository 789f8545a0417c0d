//! Script fixtures and a small run harness.

use std::path::Path;

use clawdaw_cli::config::EngineConfig;
use clawdaw_cli::script::{Interpreter, RunOptions, RunReport, Session};
use clawdaw_spec::Project;

/// A short song exercising patterns, roles, expression, mix and sections.
pub const SONG_SCRIPT: &str = r#"# four bars of beat with a bass line
new_project "E2E Song" 124
set_swing 12

add_track Drums
set_sampler 0 drums
set_drum_kit 0 house_clean
set_humanize 0 timing=8 velocity=6 seed=7
new_pattern 0 main 1:0
add_note_pat 0 main kick 0 0:0:120 110
add_note_pat 0 main kick 0:2 0:0:120 110
add_note_pat 0 main snare 0:1 0:0:120 100
add_note_pat 0 main snare 0:3 0:0:120 100
add_note_pat 0 main hh 0:0:240 0:0:60 70 chance=0.5
add_note_pat 0 main hh 0:1:240 0:0:60 70 chance=0.5 accent=1.2
place_pattern 0 main 0 4

add_track "Sub Bass" bass
new_pattern 1 main 1:0
add_note_pat 1 main 36 0 0:1 100 glide_ticks=30
add_note_pat 1 main 39 0:2 0:1 90
place_pattern 1 main 0 4

add_section intro 0 2
add_section drop 2 2

eq track=1 type=hp f=30
comp bus=drums threshold_db=-12 ratio=3
sidechain src=kick dst=1
send track=1 bus=reverb level=0.15
limiter limit=0.97
"#;

/// Final project and report of a run.
#[derive(Debug)]
pub struct Outcome {
    pub report: RunReport,
    pub project: Option<Project>,
}

fn run(script: &str, options: RunOptions, base_dir: Option<&Path>) -> Outcome {
    let mut interpreter = Interpreter::new(Session::new(EngineConfig::default()), options);
    let report = interpreter.run_script(script, base_dir);
    Outcome {
        report,
        project: interpreter.into_session().into_project(),
    }
}

pub fn run_strict(script: &str) -> Outcome {
    run(
        script,
        RunOptions {
            strict: true,
            dry_run: false,
        },
        None,
    )
}

pub fn run_lenient(script: &str) -> Outcome {
    run(script, RunOptions::default(), None)
}

/// Runs a script file in a fresh session.
pub fn run_file(path: &Path, options: RunOptions) -> Outcome {
    let mut interpreter = Interpreter::new(Session::new(EngineConfig::default()), options);
    let report = interpreter
        .run_file(path)
        .unwrap_or_else(|e| panic!("cannot run {}: {}", path.display(), e));
    Outcome {
        report,
        project: interpreter.into_session().into_project(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_script_runs_clean() {
        let outcome = run_strict(SONG_SCRIPT);
        assert!(outcome.report.is_ok(), "{:?}", outcome.report.state);
        assert!(outcome.report.warnings.is_empty());
        let project = outcome.project.unwrap();
        assert_eq!(project.tracks.len(), 2);
        assert_eq!(project.sections.len(), 2);
    }
}
