use std::fs;
use std::sync::atomic::Ordering;

use super::*;
use crate::config::EngineConfig;
use crate::render::MemoryGateway;
use clawdaw_spec::ErrorKind;
use pretty_assertions::assert_eq;

fn interpreter(strict: bool, dry_run: bool) -> Interpreter {
    Interpreter::new(
        Session::new(EngineConfig::default()),
        RunOptions { strict, dry_run },
    )
}

const SONG: &str = "\
# a two bar loop
new_project demo 120

add_track Drums
set_sampler 0 drums
new_pattern 0 main 1:0
add_note_pat 0 main kick 0 0:0:120
add_note_pat 0 main snare 0:1 0:0:120
place_pattern 0 main 0 2
";

#[test]
fn runs_a_script_and_reports() {
    let mut interp = interpreter(true, false);
    let report = interp.run_script(SONG, None);
    assert!(report.is_ok());
    assert_eq!(report.commands_executed, 7);
    assert!(report.warnings.is_empty());
    let derived = report.derived.unwrap();
    assert_eq!(derived.song_length_ticks, 3840);
    assert_eq!(derived.song_bars_estimate, 2.0);
    assert_eq!(report.project_hash.map(|h| h.len()), Some(64));
}

#[test]
fn strict_run_stops_at_first_error() {
    let mut interp = interpreter(true, false);
    let report = interp.run_script("new_project demo\nbad_cmd\nadd_track X 0\n", None);
    match &report.state {
        RunState::Failed {
            line, text, kind, ..
        } => {
            assert_eq!(*line, 2);
            assert_eq!(text, "bad_cmd");
            assert_eq!(*kind, ErrorKind::Syntax.as_str());
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(interp.session().project().unwrap().tracks.len(), 0);
}

#[test]
fn lenient_run_records_warnings() {
    let mut interp = interpreter(false, false);
    let report = interp.run_script("new_project demo\nbad_cmd\nadd_track X 0\n", None);
    assert!(report.is_ok());
    assert_eq!(report.commands_executed, 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("error line 2: bad_cmd ("));
    assert_eq!(interp.session().project().unwrap().tracks.len(), 1);
}

#[test]
fn includes_resolve_against_the_script_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("parts")).unwrap();
    fs::write(
        dir.path().join("parts/drums.txt"),
        "add_track Drums\ninclude more.txt\n",
    )
    .unwrap();
    fs::write(dir.path().join("parts/more.txt"), "add_track Perc\n").unwrap();
    let main = dir.path().join("song.txt");
    fs::write(&main, "new_project demo\ninclude parts/drums.txt\nadd_track Bass\n").unwrap();

    let mut interp = interpreter(true, false);
    let report = interp.run_file(&main).unwrap();
    assert!(report.is_ok(), "{:?}", report.state);
    let names: Vec<&str> = interp
        .session()
        .project()
        .unwrap()
        .tracks
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(names, vec!["Drums", "Perc", "Bass"]);
    assert_eq!(report.commands_executed, 4);
}

#[test]
fn include_cycles_are_include_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "include b.txt\n").unwrap();
    fs::write(dir.path().join("b.txt"), "include a.txt\n").unwrap();

    let mut interp = interpreter(true, false);
    let report = interp.run_file(&dir.path().join("a.txt")).unwrap();
    match report.state {
        RunState::Failed {
            file, kind, message, ..
        } => {
            assert_eq!(file.as_deref(), Some("b.txt"));
            assert_eq!(kind, ErrorKind::Include.as_str());
            assert!(message.contains("a.txt -> b.txt -> a.txt"), "{}", message);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn missing_include_is_a_warning_when_lenient() {
    let dir = tempfile::tempdir().unwrap();
    let mut interp = interpreter(false, false);
    let report = interp.run_script("new_project demo\ninclude nope.txt\nadd_track A\n", Some(dir.path()));
    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("include not found"));

    let mut strict = interpreter(true, false);
    let report = strict.run_script("include nope.txt\n", Some(dir.path()));
    assert!(matches!(report.state, RunState::Failed { line: 1, .. }));
}

#[test]
fn missing_script_file_is_an_include_error() {
    let mut interp = interpreter(false, false);
    let err = interp.run_file(std::path::Path::new("/no/such/script.txt")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Include);
}

#[test]
fn dry_run_suppresses_only_exports() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MemoryGateway::new(b"RIFF".to_vec());
    let config = EngineConfig {
        soundfont_path: Some("gm.sf2".into()),
        out_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let session = Session::new(config).with_gateway(Box::new(gateway.clone()));
    let mut interp = Interpreter::new(
        session,
        RunOptions {
            strict: true,
            dry_run: true,
        },
    );
    let script = format!(
        "{}export_wav\nexport_midi song.mid\ncompile_mix \"{}\"\n",
        SONG,
        dir.path().join("plan.json").display()
    );
    let report = interp.run_script(&script, None);
    assert!(report.is_ok(), "{:?}", report.state);
    assert_eq!(report.suppressed, 2);
    assert_eq!(report.commands_executed, 10);
    assert!(gateway.requests().is_empty());
    assert!(!dir.path().join("demo.wav").exists());
    assert!(dir.path().join("plan.json").exists());
}

#[test]
fn cancellation_stops_before_the_next_line() {
    let mut interp = interpreter(true, false);
    interp.cancel_handle().store(true, Ordering::SeqCst);
    let report = interp.run_script("new_project demo\n", None);
    assert_eq!(report.state, RunState::Cancelled { line: 1 });
    assert_eq!(report.commands_executed, 0);
}

#[test]
fn apply_works_one_line_at_a_time() {
    let mut interp = interpreter(true, false);
    assert_eq!(interp.apply("  # nothing").unwrap(), Applied::Skipped);
    assert!(matches!(
        interp.apply("new_project demo").unwrap(),
        Applied::Executed(Some(_))
    ));
    let err = interp.apply("set_pan 0 64").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
}

#[test]
fn report_serializes_flat_state() {
    let mut interp = interpreter(true, false);
    let report = interp.run_script("new_project demo\nset_bpm 9000\n", None);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["state"], "failed");
    assert_eq!(json["line"], 2);
    assert_eq!(json["code"], "E300");
    assert_eq!(json["commands_executed"], 1);
}
