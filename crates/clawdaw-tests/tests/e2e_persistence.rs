//! End-to-End Persistence Tests for clawdaw
//!
//! Tests verify:
//! - Saved projects reload unchanged and hash the same
//! - Legacy documents migrate with a change list and dangling clips dropped
//! - Clip copying works on whole bars
//! - Reference reports written by scripts match the library analysis
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p clawdaw-tests --test e2e_persistence
//! ```

use std::fs;

use clawdaw_cli::input::load_project;
use clawdaw_cli::script::RunOptions;
use clawdaw_spec::hash::canonical_project_hash;
use clawdaw_spec::validation::migrate::MigrationAction;
use clawdaw_spec::validation::references::{analyze_references, ReferenceReport};
use clawdaw_spec::validation::validate_project;
use clawdaw_spec::SCHEMA_VERSION;
use clawdaw_tests::fixtures::run_file;
use clawdaw_tests::{run_strict, SONG_SCRIPT};
use pretty_assertions::assert_eq;
use serde_json::json;

fn strict() -> RunOptions {
    RunOptions {
        strict: true,
        dry_run: false,
    }
}

#[test]
fn test_saved_project_reloads_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/song.json");
    let outcome = run_strict(&format!(
        "{}save_project \"{}\"\n",
        SONG_SCRIPT,
        path.display()
    ));
    assert!(outcome.report.is_ok(), "{:?}", outcome.report.state);
    let project = outcome.project.unwrap();

    let loaded = load_project(&path).unwrap();
    assert!(loaded.migration.is_clean(), "{:?}", loaded.migration.entries);
    assert_eq!(loaded.project, project);
    assert_eq!(
        canonical_project_hash(&loaded.project).unwrap(),
        outcome.report.project_hash.unwrap()
    );
}

#[test]
fn test_open_edit_save_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.json");
    let first = run_strict(&format!(
        "{}save_project \"{}\"\n",
        SONG_SCRIPT,
        path.display()
    ));
    assert!(first.report.is_ok());

    // Project paths are not include paths; they resolve from the cwd.
    fs::write(
        dir.path().join("edit.txt"),
        format!(
            "open_project \"{p}\"\nadd_track Pad 89\nsave_project\n",
            p = path.display()
        ),
    )
    .unwrap();
    let second = run_file(&dir.path().join("edit.txt"), strict());
    assert!(second.report.is_ok(), "{:?}", second.report.state);

    let reloaded = load_project(&path).unwrap().project;
    let names: Vec<&str> = reloaded.tracks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Drums", "Sub Bass", "Pad"]);
    assert_eq!(reloaded.sections.len(), 2);
}

fn legacy_document() -> serde_json::Value {
    json!({
        "schema_version": 11,
        "name": "old song",
        "tempo_bpm": 128,
        "ppq": 480,
        "swing_percent": 10,
        "tracks": [
            {
                "name": "Drums",
                "channel": 9,
                "program": 0,
                "volume": 100,
                "pan": 64,
                "patterns": {
                    "p1": {
                        "name": "p1",
                        "length": 1920,
                        "notes": [{"start": 0, "duration": 120, "pitch": 36, "velocity": 110}]
                    }
                },
                "clips": [
                    {"pattern": "p1", "start": 0, "repeats": 2},
                    {"pattern": "gone", "start": 3840, "repeats": 1}
                ]
            }
        ]
    })
}

#[test]
fn test_legacy_document_migrates_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("old.json");
    let new = dir.path().join("new.json");
    fs::write(&old, legacy_document().to_string()).unwrap();

    let loaded = load_project(&old).unwrap();
    assert_eq!(loaded.migration.from_version, 11);
    assert_eq!(loaded.project.schema_version, SCHEMA_VERSION);
    assert_eq!(loaded.project.bpm, 128.0);
    assert_eq!(loaded.project.swing, 10);
    assert_eq!(loaded.project.tracks[0].clips.len(), 1);
    let dropped: Vec<_> = loaded.migration.reference_errors().collect();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].field, "tracks[0].clips[1]");
    assert_eq!(dropped[0].action, MigrationAction::DroppedReference);
    assert!(validate_project(&loaded.project).is_ok());

    let outcome = run_strict(&format!(
        "open_project \"{}\"\nsave_project \"{}\"\n",
        old.display(),
        new.display()
    ));
    assert!(outcome.report.is_ok(), "{:?}", outcome.report.state);
    assert!(outcome.report.output[0].contains("schema 11 ->"));

    let again = load_project(&new).unwrap();
    assert!(again.migration.is_clean(), "{:?}", again.migration.entries);
    assert_eq!(again.project, loaded.project);
}

#[test]
fn test_unreadable_project_is_reference_error() {
    let outcome = run_strict("open_project /no/such/project.json\n");
    match outcome.report.state {
        clawdaw_cli::script::RunState::Failed { kind, .. } => assert_eq!(kind, "reference"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(outcome.project.is_none());
}

#[test]
fn test_copy_bars_copies_clips_starting_in_range() {
    let outcome = run_strict(
        "\
new_project demo
add_track Keys
new_pattern 0 a 1:0
add_note_pat 0 a 60 0 0:1
place_pattern 0 a 0
place_pattern 0 a 1:0
place_pattern 0 a 2:0
place_pattern 0 a 3:0
copy_bars 0 2 8
",
    );
    assert!(outcome.report.is_ok(), "{:?}", outcome.report.state);
    let project = outcome.project.unwrap();
    let starts: Vec<i64> = project.tracks[0]
        .clips
        .iter()
        .map(|c| c.start_tick)
        .collect();
    assert_eq!(starts, vec![0, 1920, 3840, 5760, 8 * 1920, 9 * 1920]);
    assert_eq!(outcome.report.output.last().unwrap(), "copied 2 clip(s)");
}

#[test]
fn test_analyze_refs_writes_reference_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("refs.json");
    let outcome = run_strict(&format!(
        "\
new_project demo
add_track Keys
new_pattern 0 a 1:0
new_pattern 0 b 1:0
place_pattern 0 a 0
analyze_refs \"{}\"
",
        out.display()
    ));
    assert!(outcome.report.is_ok(), "{:?}", outcome.report.state);
    assert_eq!(
        outcome.report.output.last().unwrap(),
        "0 missing, 1 unused pattern reference(s)"
    );

    let report: ReferenceReport = analyze_references(&outcome.project.unwrap());
    assert!(report.missing.is_empty());
    assert_eq!(report.unused.len(), 1);
    assert_eq!(report.unused[0].pattern, "b");

    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written, serde_json::to_value(&report).unwrap());
}
