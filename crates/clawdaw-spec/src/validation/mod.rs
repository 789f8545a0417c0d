//! Project validation logic.

pub mod migrate;
pub mod references;

#[cfg(test)]
mod tests;

use std::sync::OnceLock;

use regex::Regex;

use crate::bus::pick_role_source;
use crate::error::{ErrorCode, ValidationError, ValidationResult, ValidationWarning, WarningCode};
use crate::limits::{
    MAX_BPM, MAX_CLIPS_PER_TRACK, MAX_HUMANIZE_VELOCITY, MAX_NOTES_PER_PATTERN,
    MAX_PATTERNS_PER_TRACK, MAX_SWING, MAX_TICK, MAX_TRACKS, MIN_BPM,
};
use crate::project::{Project, Region, SCHEMA_VERSION};

pub use migrate::{
    load_project_str, migrate_document, to_json_pretty, validate_and_migrate, MigrationAction,
    MigrationEntry, MigrationReport,
};
pub use references::{analyze_references, MissingPattern, ReferenceReport, UnusedPattern};

/// Bus names: lowercase identifier, at most 32 characters.
const BUS_NAME_PATTERN: &str = r"^[a-z][a-z0-9_-]{0,31}$";

static BUS_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn bus_name_regex() -> &'static Regex {
    BUS_NAME_REGEX.get_or_init(|| Regex::new(BUS_NAME_PATTERN).expect("invalid regex pattern"))
}

/// Returns true if `name` is usable as a bus identifier.
pub fn is_valid_bus_name(name: &str) -> bool {
    bus_name_regex().is_match(name)
}

/// Validates a project without modifying it.
///
/// Errors mark states the engine would refuse to render; warnings mark
/// states that are legal but probably unintended.
pub fn validate_project(project: &Project) -> ValidationResult {
    let mut result = ValidationResult::default();

    validate_transport(project, &mut result);
    validate_tracks(project, &mut result);
    validate_sections(project, &mut result);
    validate_mix(project, &mut result);

    result
}

fn out_of_range(result: &mut ValidationResult, message: String, path: impl Into<String>) {
    result.add_error(ValidationError::with_path(
        ErrorCode::ValueOutOfRange,
        message,
        path,
    ));
}

fn validate_transport(project: &Project, result: &mut ValidationResult) {
    if project.schema_version != SCHEMA_VERSION {
        result.add_error(ValidationError::with_path(
            ErrorCode::UnsupportedSchemaVersion,
            format!(
                "schema_version {} is not {}; load through migration first",
                project.schema_version, SCHEMA_VERSION
            ),
            "schema_version",
        ));
    }
    if !(MIN_BPM..=MAX_BPM).contains(&project.bpm) {
        out_of_range(
            result,
            format!("bpm {} outside {}..={}", project.bpm, MIN_BPM, MAX_BPM),
            "bpm",
        );
    }
    if project.swing > MAX_SWING {
        out_of_range(
            result,
            format!("swing {} outside 0..={}", project.swing, MAX_SWING),
            "swing",
        );
    }
    if project.tracks.len() > MAX_TRACKS {
        out_of_range(
            result,
            format!("{} tracks exceeds {}", project.tracks.len(), MAX_TRACKS),
            "tracks",
        );
    }

    for (field, region) in [
        ("loop_region", project.loop_region),
        ("render_region", project.render_region),
    ] {
        if let Some(Region { start, end }) = region {
            if end <= start {
                result.add_warning(ValidationWarning::with_path(
                    WarningCode::EmptyRegion,
                    format!("region [{}, {}) is empty", start, end),
                    field,
                ));
            } else if start < 0 || end > MAX_TICK {
                out_of_range(
                    result,
                    format!("region [{}, {}) outside 0..={}", start, end, MAX_TICK),
                    field,
                );
            }
        }
    }
}

fn validate_tracks(project: &Project, result: &mut ValidationResult) {
    let ppq = i64::from(project.ppq);

    for (ti, track) in project.tracks.iter().enumerate() {
        let path = format!("tracks[{}]", ti);

        if track.channel > 15 {
            out_of_range(
                result,
                format!("channel {} outside 0..=15", track.channel),
                format!("{}.channel", path),
            );
        }
        if !(0..=2 * ppq).contains(&track.glide_ticks) {
            out_of_range(
                result,
                format!("glide {} outside 0..={}", track.glide_ticks, 2 * ppq),
                format!("{}.glide_ticks", path),
            );
        }
        if !(0..=ppq / 8).contains(&track.humanize.timing)
            || track.humanize.velocity > MAX_HUMANIZE_VELOCITY
        {
            out_of_range(
                result,
                format!(
                    "humanize ({}, {}) outside timing 0..={} velocity 0..={}",
                    track.humanize.timing,
                    track.humanize.velocity,
                    ppq / 8,
                    MAX_HUMANIZE_VELOCITY
                ),
                format!("{}.humanize", path),
            );
        }
        if let Some(bus) = &track.bus {
            if !is_valid_bus_name(bus) {
                out_of_range(
                    result,
                    format!("bus name '{}' is not a valid identifier", bus),
                    format!("{}.bus", path),
                );
            }
        }

        if track.patterns.len() > MAX_PATTERNS_PER_TRACK {
            out_of_range(
                result,
                format!("{} patterns exceeds {}", track.patterns.len(), MAX_PATTERNS_PER_TRACK),
                format!("{}.patterns", path),
            );
        }
        if track.clips.len() > MAX_CLIPS_PER_TRACK {
            out_of_range(
                result,
                format!("{} clips exceeds {}", track.clips.len(), MAX_CLIPS_PER_TRACK),
                format!("{}.clips", path),
            );
        }

        for (name, pattern) in &track.patterns {
            let ppath = format!("{}.patterns.{}", path, name);
            if pattern.length_ticks <= 0 || pattern.length_ticks > MAX_TICK {
                out_of_range(
                    result,
                    format!("pattern length {} outside 1..={}", pattern.length_ticks, MAX_TICK),
                    format!("{}.length_ticks", ppath),
                );
            }
            if pattern.notes.len() > MAX_NOTES_PER_PATTERN {
                out_of_range(
                    result,
                    format!("{} notes exceeds {}", pattern.notes.len(), MAX_NOTES_PER_PATTERN),
                    format!("{}.notes", ppath),
                );
            }
            for (ni, note) in pattern.notes.iter().enumerate() {
                if note.start_tick < 0 || note.start_tick >= pattern.length_ticks {
                    result.add_error(ValidationError::with_path(
                        ErrorCode::NoteOutOfPattern,
                        format!(
                            "note starts at {} outside [0, {})",
                            note.start_tick, pattern.length_ticks
                        ),
                        format!("{}.notes[{}]", ppath, ni),
                    ));
                } else if let Err(e) = note.check(pattern.length_ticks) {
                    out_of_range(result, e.to_string(), format!("{}.notes[{}]", ppath, ni));
                }
            }
        }

        for (ci, clip) in track.clips.iter().enumerate() {
            let cpath = format!("{}.clips[{}]", path, ci);
            match track.patterns.get(&clip.pattern) {
                None => result.add_error(ValidationError::with_path(
                    ErrorCode::DanglingPattern,
                    format!("clip references missing pattern '{}'", clip.pattern),
                    cpath,
                )),
                Some(pattern) => {
                    if clip.start_tick < 0 || clip.repeats == 0 {
                        out_of_range(
                            result,
                            format!(
                                "clip start {} / repeats {} invalid",
                                clip.start_tick, clip.repeats
                            ),
                            cpath,
                        );
                    } else if clip.end_tick(pattern.length_ticks) > MAX_TICK {
                        out_of_range(
                            result,
                            format!("clip ends past {}", MAX_TICK),
                            cpath,
                        );
                    }
                }
            }
        }

        if track.clips.is_empty() {
            result.add_warning(ValidationWarning::with_path(
                WarningCode::EmptyTrack,
                format!("track '{}' has no clips", track.name),
                path.clone(),
            ));
        }
    }

    for unused in analyze_references(project).unused {
        result.add_warning(ValidationWarning::with_path(
            WarningCode::UnusedPattern,
            format!("pattern '{}' is never placed", unused.pattern),
            format!("tracks[{}].patterns.{}", unused.track, unused.pattern),
        ));
    }
}

fn validate_sections(project: &Project, result: &mut ValidationResult) {
    for (i, pair) in project.sections.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        if b.start_bar < a.start_bar {
            result.add_error(ValidationError::with_path(
                ErrorCode::SectionsUnsorted,
                format!("section '{}' starts before '{}'", b.name, a.name),
                format!("sections[{}]", i + 1),
            ));
        }
    }
    for (i, a) in project.sections.iter().enumerate() {
        if a.length_bars == 0 {
            out_of_range(
                result,
                format!("section '{}' has no length", a.name),
                format!("sections[{}]", i),
            );
        }
        for (j, b) in project.sections.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                result.add_error(ValidationError::with_path(
                    ErrorCode::SectionOverlap,
                    format!("section '{}' overlaps '{}'", a.name, b.name),
                    format!("sections[{}]", j),
                ));
            }
        }
    }
}

fn validate_mix(project: &Project, result: &mut ValidationResult) {
    let n = project.tracks.len();

    for key in project.mix.tracks.keys() {
        match key.parse::<usize>() {
            Ok(i) if i < n => {}
            _ => result.add_error(ValidationError::with_path(
                ErrorCode::MixMissingTrack,
                format!("mix entry '{}' names no track", key),
                format!("mix.tracks.{}", key),
            )),
        }
    }

    for (i, entry) in project.mix.tracks.iter() {
        for bus in entry.sends.keys() {
            if !project.mix.busses.contains_key(bus) {
                result.add_error(ValidationError::with_path(
                    ErrorCode::MixMissingTrack,
                    format!("send targets undeclared bus '{}'", bus),
                    format!("mix.tracks.{}.sends.{}", i, bus),
                ));
            }
        }
    }

    for (name, bus) in &project.mix.busses {
        if let Some(out) = &bus.output {
            if out != "master" && !project.mix.busses.contains_key(out) {
                result.add_error(ValidationError::with_path(
                    ErrorCode::MixMissingTrack,
                    format!("bus '{}' outputs to undeclared bus '{}'", name, out),
                    format!("mix.busses.{}.output", name),
                ));
            }
        }
    }

    for (si, sc) in project.mix.sidechain.iter().enumerate() {
        let path = format!("mix.sidechain[{}]", si);
        if sc.dst >= n {
            result.add_error(ValidationError::with_path(
                ErrorCode::SidechainMissingTrack,
                format!("sidechain destination {} does not exist", sc.dst),
                path.clone(),
            ));
        }
        let src = match sc.src.track_index() {
            Some(i) => Some(i).filter(|i| *i < n),
            None => sc.src.role_name().and_then(|role| {
                pick_role_source(project.tracks.iter().map(|t| t.name.as_str()), role)
            }),
        };
        match src {
            None => result.add_error(ValidationError::with_path(
                ErrorCode::SidechainMissingTrack,
                format!("sidechain source '{}' resolves to no track", sc.src),
                path,
            )),
            Some(s) if s == sc.dst => result.add_error(ValidationError::with_path(
                ErrorCode::SidechainSelf,
                format!("sidechain routes track {} to itself", s),
                path,
            )),
            Some(_) => {}
        }
    }
}
