//! Validation and migration tests.

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::drumkit::DrumRole;
use crate::mix::{SidechainSource, SidechainSpec, TrackMix};
use crate::project::{Clip, Note, NoteKey, Section, TrackMode};

fn make_valid_project() -> Project {
    let mut p = Project::new("valid", 120.0);
    let drums = p.add_track("drums", TrackMode::default()).unwrap();
    let bass = p.add_track("bass", TrackMode::default()).unwrap();
    for t in [drums, bass] {
        p.new_pattern(t, "main", 1920).unwrap();
        p.add_note_to_pattern(t, "main", Note::new(NoteKey::Pitch(36), 0, 240, 100))
            .unwrap();
        p.place_clip(t, "main", 0, 4).unwrap();
    }
    p.add_section(Section::new("intro", 0, 4)).unwrap();
    p
}

#[test]
fn test_valid_project() {
    let p = make_valid_project();
    let result = validate_project(&p);
    assert!(result.is_ok(), "errors: {:?}", result.errors);
    assert!(result.warnings.is_empty(), "warnings: {:?}", result.warnings);
}

#[test]
fn test_dangling_clip_is_reference_error() {
    let mut p = make_valid_project();
    p.tracks[1].clips.push(Clip::new("nope", 0, 1));
    let result = validate_project(&p);
    let err = result
        .errors
        .iter()
        .find(|e| e.code == ErrorCode::DanglingPattern)
        .unwrap();
    assert_eq!(err.path.as_deref(), Some("tracks[1].clips[1]"));
    assert_eq!(err.code.kind(), crate::error::ErrorKind::Reference);
}

#[test]
fn test_sections_unsorted_and_overlapping() {
    let mut p = make_valid_project();
    p.sections = vec![Section::new("b", 8, 4), Section::new("a", 0, 10)];
    let result = validate_project(&p);
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == ErrorCode::SectionsUnsorted));
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == ErrorCode::SectionOverlap));
}

#[test]
fn test_sidechain_checks() {
    let mut p = make_valid_project();
    p.mix.sidechain.push(SidechainSpec::new(SidechainSource::Track(1), 1));
    p.mix
        .sidechain
        .push(SidechainSpec::new(SidechainSource::Role("snare".into()), 1));
    p.mix.sidechain.push(SidechainSpec::new(SidechainSource::Track(0), 7));
    let result = validate_project(&p);
    let codes: Vec<ErrorCode> = result.errors.iter().map(|e| e.code).collect();
    assert_eq!(
        codes,
        vec![
            ErrorCode::SidechainSelf,
            ErrorCode::SidechainMissingTrack,
            ErrorCode::SidechainMissingTrack,
        ]
    );
}

#[test]
fn test_kick_role_falls_back_to_drums_track() {
    let mut p = make_valid_project();
    p.mix
        .sidechain
        .push(SidechainSpec::new(SidechainSource::Role("kick".into()), 1));
    assert!(validate_project(&p).is_ok());
}

#[test]
fn test_numeric_role_is_a_track_index() {
    let mut p = make_valid_project();
    p.mix
        .sidechain
        .push(SidechainSpec::new(SidechainSource::Role("0".into()), 1));
    assert!(validate_project(&p).is_ok());

    p.mix
        .sidechain
        .push(SidechainSpec::new(SidechainSource::Role("9".into()), 1));
    let codes: Vec<ErrorCode> = validate_project(&p).errors.iter().map(|e| e.code).collect();
    assert_eq!(codes, vec![ErrorCode::SidechainMissingTrack]);
}

#[test]
fn test_mix_entry_for_missing_track() {
    let mut p = make_valid_project();
    p.mix.tracks.insert("5".into(), TrackMix::default());
    p.mix.track_mut(0).sends.insert("reverb".into(), 0.2);
    let result = validate_project(&p);
    let paths: Vec<&str> = result
        .errors
        .iter()
        .filter(|e| e.code == ErrorCode::MixMissingTrack)
        .filter_map(|e| e.path.as_deref())
        .collect();
    assert_eq!(paths, vec!["mix.tracks.5", "mix.tracks.0.sends.reverb"]);
}

#[test]
fn test_warnings_for_unused_and_empty() {
    let mut p = make_valid_project();
    p.new_pattern(0, "spare", 960).unwrap();
    p.add_track("pad", TrackMode::default()).unwrap();
    let result = validate_project(&p);
    assert!(result.is_ok());
    let codes: Vec<WarningCode> = result.warnings.iter().map(|w| w.code).collect();
    assert_eq!(codes, vec![WarningCode::EmptyTrack, WarningCode::UnusedPattern]);
}

#[test]
fn test_bus_name_pattern() {
    assert!(is_valid_bus_name("drums"));
    assert!(is_valid_bus_name("fx_2"));
    assert!(!is_valid_bus_name("Drums"));
    assert!(!is_valid_bus_name("2fx"));
    assert!(!is_valid_bus_name(""));
}

// ----------------------------------------------------------------------
// Migration
// ----------------------------------------------------------------------

#[test]
fn test_current_project_round_trips_clean() {
    let mut p = make_valid_project();
    p.set_loop(0, 7680).unwrap();
    p.extra.insert("author".into(), json!("someone"));
    let text = to_json_pretty(&p).unwrap();
    let (loaded, report) = load_project_str(&text).unwrap();
    assert!(report.is_clean(), "entries: {:?}", report.entries);
    assert_eq!(loaded, p);
}

#[test]
fn test_validate_and_migrate_is_noop_on_valid_project() {
    let mut p = make_valid_project();
    let before = p.clone();
    let report = validate_and_migrate(&mut p);
    assert!(report.is_clean());
    assert_eq!(p, before);
}

fn legacy_v11() -> serde_json::Value {
    json!({
        "schema_version": 11,
        "name": "old",
        "tempo_bpm": 500,
        "ppq": 480,
        "swing_percent": 90,
        "loop_start": 0,
        "loop_end": 1920,
        "arrangement": {
            "sections": [{"name": "intro", "start": 0, "length": 7680}],
            "variations": []
        },
        "mix": {"sidechain": [{"src": 0, "src_role": "kick", "dst": 1}]},
        "tracks": [
            {
                "name": "Drums",
                "channel": 9,
                "program": 0,
                "volume": 200,
                "pan": 64,
                "reverb": 0,
                "chorus": 0,
                "sampler": "drums",
                "sampler_preset": "default",
                "drum_kit": "nonexistent",
                "glide_ticks": 0,
                "humanize": {"timing": 0, "velocity": 0, "seed": 0},
                "patterns": {
                    "p1": {
                        "name": "p1",
                        "length": 1920,
                        "notes": [
                            {"start": 0, "duration": 120, "pitch": 36, "velocity": 110, "role": "kick"},
                            {"start": 480, "duration": 120, "pitch": 0, "velocity": 300, "role": "???"}
                        ]
                    }
                },
                "clips": [
                    {"pattern": "p1", "start": 0, "repeats": 2},
                    {"pattern": "missing", "start": 0, "repeats": 1}
                ]
            },
            {
                "name": "Bass",
                "channel": 1,
                "program": 33,
                "notes": [{"start": 0, "duration": 480, "pitch": 36, "velocity": 100}]
            }
        ]
    })
}

#[test]
fn test_legacy_document_lifts_and_clamps() {
    let text = legacy_v11().to_string();
    let (p, report) = load_project_str(&text).unwrap();

    assert_eq!(report.from_version, 11);
    assert_eq!(p.schema_version, SCHEMA_VERSION);
    assert_eq!(p.bpm, 400.0);
    assert_eq!(p.swing, 75);
    assert_eq!(p.loop_region, Some(Region { start: 0, end: 1920 }));
    assert_eq!(p.sections, vec![Section::new("intro", 0, 4)]);
    assert!(!p.extra.contains_key("arrangement"));

    let drums = &p.tracks[0];
    assert!(matches!(drums.mode, TrackMode::Sampler { .. }));
    assert_eq!(drums.mixer.volume, 127);
    assert_eq!(drums.drum_kit, "trap_hard");
    let notes = &drums.patterns["p1"].notes;
    assert_eq!(notes[0].pitch, NoteKey::Role(DrumRole::Kick));
    assert_eq!(notes[1].pitch, NoteKey::Role(DrumRole::HatClosed));
    assert_eq!(notes[1].velocity, 127);
    assert_eq!(drums.clips, vec![Clip::new("p1", 0, 2)]);

    let bass = &p.tracks[1];
    assert_eq!(bass.mode, TrackMode::GmInstrument { program: 33 });
    assert_eq!(bass.patterns["linear"].length_ticks, 1920);
    assert_eq!(bass.clips, vec![Clip::new("linear", 0, 1)]);

    assert_eq!(
        p.mix.sidechain[0].src,
        SidechainSource::Role("kick".into())
    );

    let dropped: Vec<&str> = report.reference_errors().map(|e| e.field.as_str()).collect();
    assert_eq!(dropped, vec!["tracks[0].clips[1]"]);
    assert!(validate_project(&p).is_ok());
}

#[test]
fn test_migration_is_idempotent() {
    let (p, _) = load_project_str(&legacy_v11().to_string()).unwrap();
    let (again, report) = load_project_str(&to_json_pretty(&p).unwrap()).unwrap();
    assert!(report.is_clean(), "entries: {:?}", report.entries);
    assert_eq!(again, p);
}

#[test]
fn test_schema_one_gets_defaults() {
    let doc = json!({
        "name": "ancient",
        "tempo_bpm": 90,
        "tracks": [{"name": "keys", "channel": 0, "program": 4}]
    });
    let (p, report) = load_project_str(&doc.to_string()).unwrap();
    assert_eq!(report.from_version, 1);
    assert_eq!(p.bpm, 90.0);
    assert_eq!(p.swing, 0);
    assert_eq!(p.loop_region, None);
    assert_eq!(p.tracks[0].drum_kit, "trap_hard");
    assert!(report
        .entries
        .iter()
        .any(|e| e.action == MigrationAction::Defaulted && e.field == "swing_percent"));
}

#[test]
fn test_typed_pass_clamps_and_drops() {
    let mut p = make_valid_project();
    p.swing = 99;
    p.tracks[0].glide_ticks = 5000;
    p.tracks[0].humanize.velocity = 90;
    p.tracks[0]
        .patterns
        .get_mut("main")
        .unwrap()
        .notes
        .push(Note::new(NoteKey::Pitch(40), 5000, 10, 90));
    p.sections.push(Section::new("overlap", 2, 4));

    let report = validate_and_migrate(&mut p);
    assert_eq!(p.swing, 75);
    assert_eq!(p.tracks[0].glide_ticks, 960);
    assert_eq!(p.tracks[0].humanize.velocity, 30);
    assert_eq!(p.tracks[0].patterns["main"].notes.len(), 1);
    assert_eq!(p.sections.len(), 1);
    assert!(report
        .entries
        .iter()
        .all(|e| e.action.kind() == Some(crate::error::ErrorKind::Range)));
    assert!(validate_project(&p).is_ok());
}

#[test]
fn test_newer_schema_is_flagged_but_loaded() {
    let mut doc = serde_json::to_value(make_valid_project()).unwrap();
    doc["schema_version"] = json!(SCHEMA_VERSION + 1);
    let (p, report) = load_project_str(&doc.to_string()).unwrap();
    assert_eq!(p.schema_version, SCHEMA_VERSION);
    assert_eq!(report.from_version, SCHEMA_VERSION + 1);
    assert_eq!(report.entries[0].field, "schema_version");
}

#[test]
fn test_non_object_document_fails() {
    let err = load_project_str("[1, 2, 3]").unwrap_err();
    assert!(matches!(err, crate::error::SpecError::Malformed(_)));
}
