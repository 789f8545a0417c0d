//! Schema migration and best-effort repair of loaded projects.
//!
//! Loading runs in two passes. The document pass works on raw JSON: it walks
//! schema steps forward, lifts legacy keys into the current shape and clamps
//! integers that would not fit their typed fields. The typed pass then
//! clamps every scalar to its documented bound and drops what cannot be
//! repaired. Neither pass fails; every change is recorded.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::drumkit::{DrumKit, DrumRole, DEFAULT_KIT};
use crate::error::{ErrorKind, SpecError};
use crate::limits::{
    MAX_BPM, MAX_CLIPS_PER_TRACK, MAX_HUMANIZE_VELOCITY, MAX_NOTES_PER_PATTERN,
    MAX_PATTERNS_PER_TRACK, MAX_PPQ, MAX_SWING, MAX_TICK, MAX_TRACKS, MIN_BPM, MIN_PPQ,
};
use crate::project::{NoteKey, Project, SCHEMA_VERSION};
use crate::time::{Tick, PPQ};

/// What a migration step did to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationAction {
    /// A missing field was filled with its default.
    Defaulted,
    /// A legacy key was moved into the current shape.
    Lifted,
    /// A value was moved to the nearest legal value.
    Clamped,
    /// An item violating a bound was removed.
    Dropped,
    /// An item referencing something missing was removed.
    DroppedReference,
}

impl MigrationAction {
    /// Error kind this change corresponds to, if it repaired an error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            MigrationAction::Defaulted | MigrationAction::Lifted => None,
            MigrationAction::Clamped | MigrationAction::Dropped => Some(ErrorKind::Range),
            MigrationAction::DroppedReference => Some(ErrorKind::Reference),
        }
    }
}

/// One recorded change: `(field, old, new, reason)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationEntry {
    pub field: String,
    pub old: Value,
    pub new: Value,
    pub reason: String,
    pub action: MigrationAction,
}

/// Everything migration changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub entries: Vec<MigrationEntry>,
}

impl MigrationReport {
    fn record(
        &mut self,
        action: MigrationAction,
        field: impl Into<String>,
        old: Value,
        new: Value,
        reason: impl Into<String>,
    ) {
        self.entries.push(MigrationEntry {
            field: field.into(),
            old,
            new,
            reason: reason.into(),
            action,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that removed dangling references.
    pub fn reference_errors(&self) -> impl Iterator<Item = &MigrationEntry> {
        self.entries
            .iter()
            .filter(|e| e.action == MigrationAction::DroppedReference)
    }

    fn merge(&mut self, other: MigrationReport) {
        self.entries.extend(other.entries);
    }
}

// ----------------------------------------------------------------------
// Document pass
// ----------------------------------------------------------------------

fn keyed(pairs: &[(&str, Value)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

fn set_default(obj: &mut Map<String, Value>, key: &str, value: Value, path: &str, report: &mut MigrationReport) {
    if !obj.contains_key(key) {
        report.record(
            MigrationAction::Defaulted,
            format!("{}{}", path, key),
            Value::Null,
            value.clone(),
            "field introduced by a later schema",
        );
        obj.insert(key.to_string(), value);
    }
}

fn lift(obj: &mut Map<String, Value>, old_key: &str, new_key: &str, path: &str, report: &mut MigrationReport) {
    if let Some(v) = obj.remove(old_key) {
        if !obj.contains_key(new_key) {
            report.record(
                MigrationAction::Lifted,
                format!("{}{}", path, new_key),
                keyed(&[(old_key, v.clone())]),
                v.clone(),
                format!("renamed from '{}'", old_key),
            );
            obj.insert(new_key.to_string(), v);
        }
    }
}

/// Clamps an integer field in place. Non-numeric values become `default`.
fn clamp_int(
    obj: &mut Map<String, Value>,
    key: &str,
    lo: i64,
    hi: i64,
    default: i64,
    path: &str,
    report: &mut MigrationReport,
) {
    let Some(v) = obj.get(key) else {
        return;
    };
    let (new, reason) = match v.as_f64() {
        Some(f) if f.is_finite() => {
            let i = f.round() as i64;
            let in_range = (lo..=hi).contains(&i);
            if in_range && (v.is_i64() || v.is_u64()) {
                return;
            }
            let reason = if in_range {
                "not an integer".to_string()
            } else {
                format!("outside {}..={}", lo, hi)
            };
            (i.clamp(lo, hi), reason)
        }
        _ if v.is_null() => return,
        _ => (default, "not a number".to_string()),
    };
    let old = v.clone();
    report.record(
        MigrationAction::Clamped,
        format!("{}{}", path, key),
        old,
        json!(new),
        reason,
    );
    obj.insert(key.to_string(), json!(new));
}

/// Walks schema steps 1..=11 forward, defaulting what each introduced.
fn migrate_legacy_steps(doc: &mut Map<String, Value>, schema: u32, report: &mut MigrationReport) {
    if schema < 2 {
        set_default(doc, "swing_percent", json!(0), "", report);
        set_default(doc, "loop_start", Value::Null, "", report);
        set_default(doc, "loop_end", Value::Null, "", report);
    }
    if schema < 3 {
        set_default(doc, "render_start", Value::Null, "", report);
        set_default(doc, "render_end", Value::Null, "", report);
    }
    if schema < 5 {
        set_default(doc, "arrangement", json!({"sections": []}), "", report);
    }
    if schema < 8 {
        set_default(doc, "mix", json!({}), "", report);
    }

    if let Some(Value::Array(tracks)) = doc.get_mut("tracks") {
        for (i, t) in tracks.iter_mut().enumerate() {
            let Some(t) = t.as_object_mut() else { continue };
            let path = format!("tracks[{}].", i);
            if schema < 5 {
                set_default(t, "glide_ticks", json!(0), &path, report);
                set_default(t, "humanize", json!({"timing": 0, "velocity": 0, "seed": 0}), &path, report);
            }
            if schema < 6 {
                set_default(t, "sampler_preset", json!("default"), &path, report);
            }
            if schema < 7 {
                set_default(t, "drum_kit", json!(DEFAULT_KIT.name()), &path, report);
            }
        }
    }
}

fn lift_region(doc: &mut Map<String, Value>, start_key: &str, end_key: &str, new_key: &str, report: &mut MigrationReport) {
    let start = doc.remove(start_key);
    let end = doc.remove(end_key);
    if doc.contains_key(new_key) {
        return;
    }
    match (start.as_ref().and_then(Value::as_i64), end.as_ref().and_then(Value::as_i64)) {
        (Some(s), Some(e)) => {
            let region = json!({"start": s, "end": e});
            report.record(
                MigrationAction::Lifted,
                new_key,
                keyed(&[(start_key, json!(s)), (end_key, json!(e))]),
                region.clone(),
                format!("merged '{}'/'{}'", start_key, end_key),
            );
            doc.insert(new_key.to_string(), region);
        }
        (None, None) => {}
        _ => report.record(
            MigrationAction::Dropped,
            new_key,
            keyed(&[
                (start_key, start.unwrap_or(Value::Null)),
                (end_key, end.unwrap_or(Value::Null)),
            ]),
            Value::Null,
            "incomplete legacy region",
        ),
    }
}

fn lift_note(note: &mut Map<String, Value>, path: &str, report: &mut MigrationReport) {
    lift(note, "start", "start_tick", path, report);
    lift(note, "duration", "dur_ticks", path, report);

    if let Some(role) = note.remove("role") {
        let role_name = role.as_str().unwrap_or_default();
        match DrumRole::parse(role_name) {
            Some(r) => {
                report.record(
                    MigrationAction::Lifted,
                    format!("{}pitch", path),
                    json!({"pitch": note.get("pitch").cloned(), "role": role.clone()}),
                    json!(r.as_str()),
                    "role replaces fallback pitch",
                );
                note.insert("pitch".into(), json!(r.as_str()));
            }
            None => {
                let pitch = note.get("pitch").and_then(Value::as_i64).unwrap_or(0);
                let new = if pitch > 0 {
                    json!(pitch)
                } else {
                    json!(DrumRole::HatClosed.as_str())
                };
                report.record(
                    MigrationAction::Clamped,
                    format!("{}pitch", path),
                    role,
                    new.clone(),
                    "unknown drum role",
                );
                note.insert("pitch".into(), new);
            }
        }
    }

    match note.get("pitch") {
        Some(Value::String(s)) => {
            let resolved = DrumRole::parse(s).unwrap_or(DrumRole::HatClosed);
            if resolved.as_str() != s {
                report.record(
                    MigrationAction::Clamped,
                    format!("{}pitch", path),
                    json!(s),
                    json!(resolved.as_str()),
                    "normalized drum role",
                );
                note.insert("pitch".into(), json!(resolved.as_str()));
            }
        }
        Some(_) => clamp_int(note, "pitch", 0, 127, 60, path, report),
        None => {
            report.record(
                MigrationAction::Defaulted,
                format!("{}pitch", path),
                Value::Null,
                json!(60),
                "missing pitch",
            );
            note.insert("pitch".into(), json!(60));
        }
    }
    clamp_int(note, "velocity", 1, 127, 100, path, report);
    clamp_int(note, "start_tick", 0, MAX_TICK, 0, path, report);
    clamp_int(note, "dur_ticks", 1, MAX_TICK, 1, path, report);
    clamp_int(note, "glide_ticks", 0, MAX_TICK, 0, path, report);
}

fn lift_track(t: &mut Map<String, Value>, index: usize, ppq: i64, report: &mut MigrationReport) {
    let path = format!("tracks[{}].", index);

    if !t.contains_key("mode") {
        let program = t.remove("program");
        let sampler = t.remove("sampler").and_then(|s| s.as_str().map(str::to_lowercase));
        let preset = t
            .remove("sampler_preset")
            .or_else(|| t.remove("preset"))
            .and_then(|p| p.as_str().map(str::to_string))
            .unwrap_or_else(|| "default".to_string());
        let instrument = t.remove("instrument").filter(|v| v.is_object());

        let mode = if let Some(instr) = instrument {
            json!({
                "kind": "instrument_plugin",
                "id": instr.get("id").cloned().unwrap_or(json!("")),
                "preset": instr.get("preset").cloned().unwrap_or(json!("default")),
                "params": instr.get("params").cloned().filter(Value::is_object).unwrap_or(json!({})),
                "seed": instr.get("seed").and_then(Value::as_u64).unwrap_or(0),
            })
        } else if let Some(kind) = sampler.filter(|s| s == "drums" || s == "808") {
            json!({"kind": "sampler", "sampler": kind, "preset": preset})
        } else {
            let p = program
                .as_ref()
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .clamp(0, 127);
            json!({"kind": "gm_instrument", "program": p})
        };
        report.record(
            MigrationAction::Lifted,
            format!("{}mode", path),
            program.unwrap_or(Value::Null),
            mode.clone(),
            "flat instrument fields merged into mode",
        );
        t.insert("mode".into(), mode);
    }

    if !t.contains_key("mixer") {
        let mut mixer = Map::new();
        for (key, default) in [("volume", 100), ("pan", 64), ("reverb", 0), ("chorus", 0)] {
            mixer.insert(key.into(), t.remove(key).unwrap_or(json!(default)));
        }
        report.record(
            MigrationAction::Lifted,
            format!("{}mixer", path),
            Value::Null,
            Value::Object(mixer.clone()),
            "track-level mixer values grouped",
        );
        t.insert("mixer".into(), Value::Object(mixer));
    }

    if !t.contains_key("humanize") {
        let human = json!({
            "timing": t.remove("humanize_timing").unwrap_or(json!(0)),
            "velocity": t.remove("humanize_velocity").unwrap_or(json!(0)),
            "seed": t.remove("humanize_seed").unwrap_or(json!(0)),
        });
        t.insert("humanize".into(), human);
    }

    if let Some(Value::Object(pats)) = t.get_mut("patterns") {
        for (name, pat) in pats.iter_mut() {
            let Some(pat) = pat.as_object_mut() else { continue };
            let ppath = format!("{}patterns.{}.", path, name);
            pat.remove("name");
            lift(pat, "length", "length_ticks", &ppath, report);
            if let Some(Value::Array(notes)) = pat.get_mut("notes") {
                for (j, n) in notes.iter_mut().enumerate() {
                    if let Some(n) = n.as_object_mut() {
                        lift_note(n, &format!("{}notes[{}].", ppath, j), report);
                    }
                }
            }
        }
    }

    if let Some(Value::Array(clips)) = t.get_mut("clips") {
        for (j, c) in clips.iter_mut().enumerate() {
            if let Some(c) = c.as_object_mut() {
                let cpath = format!("{}clips[{}].", path, j);
                lift(c, "start", "start_tick", &cpath, report);
                clamp_int(c, "start_tick", 0, MAX_TICK, 0, &cpath, report);
                clamp_int(c, "repeats", 1, i64::from(u32::MAX), 1, &cpath, report);
            }
        }
    }

    // Linear notes predate patterns; they become one pattern placed at 0.
    if let Some(Value::Array(notes)) = t.remove("notes") {
        if !notes.is_empty() {
            let mut lifted = Vec::new();
            let mut end: i64 = 0;
            for (j, n) in notes.into_iter().enumerate() {
                if let Value::Object(mut n) = n {
                    lift_note(&mut n, &format!("{}notes[{}].", path, j), report);
                    let s = n.get("start_tick").and_then(Value::as_i64).unwrap_or(0);
                    let d = n.get("dur_ticks").and_then(Value::as_i64).unwrap_or(1);
                    end = end.max(s + d);
                    lifted.push(Value::Object(n));
                }
            }
            let bar = ppq * 4;
            let length = ((end + bar - 1) / bar).max(1) * bar;
            let name = "linear";
            let inserted = match t.entry("patterns").or_insert_with(|| json!({})) {
                Value::Object(pats) if !pats.contains_key(name) => {
                    pats.insert(name.into(), json!({"length_ticks": length, "notes": lifted}));
                    true
                }
                _ => false,
            };
            if inserted {
                if let Value::Array(clips) = t.entry("clips").or_insert_with(|| json!([])) {
                    clips.push(json!({"pattern": name, "start_tick": 0, "repeats": 1}));
                }
                report.record(
                    MigrationAction::Lifted,
                    format!("{}patterns.{}", path, name),
                    Value::Null,
                    json!({"length_ticks": length}),
                    "linear notes moved into a pattern",
                );
            }
        }
    }

    clamp_int(t, "channel", 0, 15, index.min(15) as i64, &path, report);
    clamp_int(t, "glide_ticks", 0, 2 * ppq, 0, &path, report);
    if let Some(Value::Object(mixer)) = t.get_mut("mixer") {
        let mpath = format!("{}mixer.", path);
        for key in ["volume", "pan", "reverb", "chorus"] {
            let default = if key == "volume" { 100 } else if key == "pan" { 64 } else { 0 };
            clamp_int(mixer, key, 0, 127, default, &mpath, report);
        }
    }
    if let Some(Value::Object(h)) = t.get_mut("humanize") {
        let hpath = format!("{}humanize.", path);
        clamp_int(h, "timing", 0, ppq / 8, 0, &hpath, report);
        clamp_int(h, "velocity", 0, i64::from(MAX_HUMANIZE_VELOCITY), 0, &hpath, report);
    }
    if let Some(Value::Object(mode)) = t.get_mut("mode") {
        clamp_int(mode, "program", 0, 127, 0, &format!("{}mode.", path), report);
    }
    if let Some(bus) = t.get("bus") {
        if !bus.is_string() {
            t.remove("bus");
        }
    }
}

fn lift_sections(doc: &mut Map<String, Value>, ppq: i64, beats: i64, report: &mut MigrationReport) {
    let Some(Value::Object(mut arrangement)) = doc.remove("arrangement") else {
        return;
    };
    let legacy = arrangement.remove("sections");
    if !doc.contains_key("sections") {
        let tpb = (ppq * beats).max(1);
        let mut sections = Vec::new();
        if let Some(Value::Array(items)) = legacy {
            for s in items {
                let name = s.get("name").and_then(Value::as_str).unwrap_or("section");
                let start = s.get("start").and_then(Value::as_i64).unwrap_or(0).max(0);
                let length = s.get("length").and_then(Value::as_i64).unwrap_or(tpb).max(1);
                sections.push(json!({
                    "name": name,
                    "start_bar": start / tpb,
                    "length_bars": ((length + tpb - 1) / tpb).max(1),
                }));
            }
        }
        if !sections.is_empty() {
            report.record(
                MigrationAction::Lifted,
                "sections",
                Value::Null,
                Value::Array(sections.clone()),
                "tick-based sections converted to bars",
            );
        }
        doc.insert("sections".into(), Value::Array(sections));
    }
    // Anything else the old arrangement block held is kept verbatim.
    let non_empty = arrangement
        .values()
        .any(|v| !(v.is_null() || v.as_array().is_some_and(Vec::is_empty)));
    if non_empty {
        doc.insert("arrangement".into(), Value::Object(arrangement));
    }
}

fn lift_mix(doc: &mut Map<String, Value>, report: &mut MigrationReport) {
    let Some(Value::Object(mix)) = doc.get_mut("mix") else {
        return;
    };
    if let Some(Value::Array(rules)) = mix.get_mut("sidechain") {
        for (i, rule) in rules.iter_mut().enumerate() {
            let Some(rule) = rule.as_object_mut() else { continue };
            if let Some(role) = rule.remove("src_role") {
                if role.is_string() {
                    report.record(
                        MigrationAction::Lifted,
                        format!("mix.sidechain[{}].src", i),
                        rule.get("src").cloned().unwrap_or(Value::Null),
                        role.clone(),
                        "role source replaces index",
                    );
                    rule.insert("src".into(), role);
                }
            }
        }
    }
}

/// Migrates a raw project document to the current schema in place.
pub fn migrate_document(doc: &mut Value, report: &mut MigrationReport) -> Result<(), SpecError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| SpecError::Malformed("top level must be an object".into()))?;

    let schema = obj
        .get("schema_version")
        .and_then(Value::as_u64)
        .map(|v| v.min(u64::from(u32::MAX)) as u32)
        .unwrap_or(1)
        .max(1);
    report.from_version = schema;
    report.to_version = SCHEMA_VERSION;

    if schema > SCHEMA_VERSION {
        report.record(
            MigrationAction::Clamped,
            "schema_version",
            json!(schema),
            json!(SCHEMA_VERSION),
            "document is newer than this engine; loading best effort",
        );
    }

    if schema < SCHEMA_VERSION {
        migrate_legacy_steps(obj, schema, report);

        lift(obj, "tempo_bpm", "bpm", "", report);
        lift(obj, "swing_percent", "swing", "", report);
        lift_region(obj, "loop_start", "loop_end", "loop_region", report);
        lift_region(obj, "render_start", "render_end", "render_region", report);
    }

    set_default(obj, "name", json!("Untitled"), "", report);
    set_default(obj, "bpm", json!(120), "", report);
    clamp_int(obj, "ppq", i64::from(MIN_PPQ), i64::from(MAX_PPQ), i64::from(PPQ), "", report);
    let ppq = obj.get("ppq").and_then(Value::as_i64).unwrap_or(i64::from(PPQ));
    let beats = obj
        .get("time_signature")
        .and_then(|ts| ts.get("beats_per_bar"))
        .and_then(Value::as_i64)
        .unwrap_or(4);

    if schema < SCHEMA_VERSION {
        lift_sections(obj, ppq, beats, report);
        lift_mix(obj, report);
    }

    if let Some(Value::Array(tracks)) = obj.get_mut("tracks") {
        for (i, t) in tracks.iter_mut().enumerate() {
            if let Some(t) = t.as_object_mut() {
                lift_track(t, i, ppq, report);
            }
        }
    }

    clamp_int(obj, "swing", 0, i64::from(MAX_SWING), 0, "", report);
    if let Some(bpm) = obj.get("bpm") {
        if bpm.as_f64().filter(|b| b.is_finite()).is_none() {
            report.record(MigrationAction::Clamped, "bpm", bpm.clone(), json!(120), "not a number");
            obj.insert("bpm".into(), json!(120));
        }
    }

    if schema != SCHEMA_VERSION {
        obj.insert("schema_version".into(), json!(SCHEMA_VERSION));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Typed pass
// ----------------------------------------------------------------------

fn clamp_tick(
    report: &mut MigrationReport,
    field: String,
    value: &mut Tick,
    lo: Tick,
    hi: Tick,
) {
    if *value < lo || *value > hi {
        let new = (*value).clamp(lo, hi);
        report.record(
            MigrationAction::Clamped,
            field,
            json!(*value),
            json!(new),
            format!("outside {}..={}", lo, hi),
        );
        *value = new;
    }
}

/// Clamps every scalar to its bound and removes dangling or invalid items.
///
/// Never fails. A project already on the current schema and within every
/// bound comes back unchanged with an empty report.
pub fn validate_and_migrate(project: &mut Project) -> MigrationReport {
    let mut report = MigrationReport {
        from_version: project.schema_version,
        to_version: SCHEMA_VERSION,
        entries: Vec::new(),
    };

    if project.schema_version != SCHEMA_VERSION {
        report.record(
            MigrationAction::Defaulted,
            "schema_version",
            json!(project.schema_version),
            json!(SCHEMA_VERSION),
            "bumped to current schema",
        );
        project.schema_version = SCHEMA_VERSION;
    }

    if !project.bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&project.bpm) {
        let new = if project.bpm.is_finite() {
            project.bpm.clamp(MIN_BPM, MAX_BPM)
        } else {
            120.0
        };
        report.record(
            MigrationAction::Clamped,
            "bpm",
            json!(project.bpm),
            json!(new),
            format!("outside {}..={}", MIN_BPM, MAX_BPM),
        );
        project.bpm = new;
    }

    if !(MIN_PPQ..=MAX_PPQ).contains(&project.ppq) {
        let new = project.ppq.clamp(MIN_PPQ, MAX_PPQ);
        report.record(MigrationAction::Clamped, "ppq", json!(project.ppq), json!(new), "outside supported range");
        project.ppq = new;
    }

    let beats = project.time_signature.beats_per_bar;
    if !(1..=16).contains(&beats) {
        let new = if beats == 0 { 4 } else { 16 };
        report.record(
            MigrationAction::Clamped,
            "time_signature.beats_per_bar",
            json!(beats),
            json!(new),
            "outside 1..=16",
        );
        project.time_signature.beats_per_bar = new;
    }

    if project.swing > MAX_SWING {
        report.record(
            MigrationAction::Clamped,
            "swing",
            json!(project.swing),
            json!(MAX_SWING),
            format!("outside 0..={}", MAX_SWING),
        );
        project.swing = MAX_SWING;
    }

    for (field, region) in [
        ("loop_region", &mut project.loop_region),
        ("render_region", &mut project.render_region),
    ] {
        if let Some(r) = *region {
            if r.start < 0 || r.end <= r.start || r.end > MAX_TICK {
                report.record(
                    MigrationAction::Dropped,
                    field,
                    json!({"start": r.start, "end": r.end}),
                    Value::Null,
                    "empty, inverted or out-of-range region",
                );
                *region = None;
            }
        }
    }

    if project.tracks.len() > MAX_TRACKS {
        report.record(
            MigrationAction::Dropped,
            "tracks",
            json!(project.tracks.len()),
            json!(MAX_TRACKS),
            "too many tracks",
        );
        project.tracks.truncate(MAX_TRACKS);
    }

    let ppq = Tick::from(project.ppq);
    let default_length = project.time_base().ticks_per_bar();
    for (ti, track) in project.tracks.iter_mut().enumerate() {
        let path = format!("tracks[{}]", ti);

        if track.channel > 15 {
            report.record(MigrationAction::Clamped, format!("{}.channel", path), json!(track.channel), json!(15), "outside 0..=15");
            track.channel = 15;
        }
        if let crate::project::TrackMode::GmInstrument { program } = &mut track.mode {
            if *program > 127 {
                report.record(MigrationAction::Clamped, format!("{}.mode.program", path), json!(*program), json!(127), "outside 0..=127");
                *program = 127;
            }
        }
        for param in [
            crate::project::MixerParam::Volume,
            crate::project::MixerParam::Pan,
            crate::project::MixerParam::Reverb,
            crate::project::MixerParam::Chorus,
        ] {
            let v = track.mixer.get(param);
            if v > 127 {
                report.record(MigrationAction::Clamped, format!("{}.mixer.{}", path, param), json!(v), json!(127), "outside 0..=127");
                track.mixer.set(param, 127);
            }
        }

        match DrumKit::resolve(&track.drum_kit) {
            Some(kit) if kit.name() == track.drum_kit => {}
            Some(kit) => {
                report.record(MigrationAction::Clamped, format!("{}.drum_kit", path), json!(track.drum_kit), json!(kit.name()), "alias normalized");
                track.drum_kit = kit.name().to_string();
            }
            None => {
                report.record(MigrationAction::Clamped, format!("{}.drum_kit", path), json!(track.drum_kit), json!(DEFAULT_KIT.name()), "unknown drum kit");
                track.drum_kit = DEFAULT_KIT.name().to_string();
            }
        }

        clamp_tick(&mut report, format!("{}.glide_ticks", path), &mut track.glide_ticks, 0, 2 * ppq);
        clamp_tick(&mut report, format!("{}.humanize.timing", path), &mut track.humanize.timing, 0, ppq / 8);
        if track.humanize.velocity > MAX_HUMANIZE_VELOCITY {
            report.record(
                MigrationAction::Clamped,
                format!("{}.humanize.velocity", path),
                json!(track.humanize.velocity),
                json!(MAX_HUMANIZE_VELOCITY),
                format!("outside 0..={}", MAX_HUMANIZE_VELOCITY),
            );
            track.humanize.velocity = MAX_HUMANIZE_VELOCITY;
        }

        if track.patterns.len() > MAX_PATTERNS_PER_TRACK {
            let keep: Vec<String> = track.patterns.keys().take(MAX_PATTERNS_PER_TRACK).cloned().collect();
            report.record(MigrationAction::Dropped, format!("{}.patterns", path), json!(track.patterns.len()), json!(MAX_PATTERNS_PER_TRACK), "too many patterns");
            track.patterns.retain(|k, _| keep.contains(k));
        }

        for (name, pattern) in track.patterns.iter_mut() {
            let ppath = format!("{}.patterns.{}", path, name);
            if pattern.length_ticks <= 0 {
                report.record(MigrationAction::Clamped, format!("{}.length_ticks", ppath), json!(pattern.length_ticks), json!(default_length), "length must be > 0");
                pattern.length_ticks = default_length;
            }
            clamp_tick(&mut report, format!("{}.length_ticks", ppath), &mut pattern.length_ticks, 1, MAX_TICK);

            if pattern.notes.len() > MAX_NOTES_PER_PATTERN {
                report.record(MigrationAction::Dropped, format!("{}.notes", ppath), json!(pattern.notes.len()), json!(MAX_NOTES_PER_PATTERN), "too many notes");
                pattern.notes.truncate(MAX_NOTES_PER_PATTERN);
            }

            let length = pattern.length_ticks;
            let mut kept = Vec::with_capacity(pattern.notes.len());
            for (ni, mut note) in std::mem::take(&mut pattern.notes).into_iter().enumerate() {
                let npath = format!("{}.notes[{}]", ppath, ni);
                if note.start_tick < 0 || note.start_tick >= length {
                    report.record(
                        MigrationAction::Dropped,
                        npath,
                        json!(note.start_tick),
                        Value::Null,
                        format!("note starts outside pattern [0, {})", length),
                    );
                    continue;
                }
                if let NoteKey::Pitch(p) = note.pitch {
                    if p > 127 {
                        report.record(MigrationAction::Clamped, format!("{}.pitch", npath), json!(p), json!(127), "outside 0..=127");
                        note.pitch = NoteKey::Pitch(127);
                    }
                }
                if !(1..=127).contains(&note.velocity) {
                    let new = note.velocity.clamp(1, 127);
                    report.record(MigrationAction::Clamped, format!("{}.velocity", npath), json!(note.velocity), json!(new), "outside 1..=127");
                    note.velocity = new;
                }
                clamp_tick(&mut report, format!("{}.dur_ticks", npath), &mut note.dur_ticks, 1, MAX_TICK);
                clamp_tick(&mut report, format!("{}.glide_ticks", npath), &mut note.glide_ticks, 0, MAX_TICK);
                if !(0.0..=1.0).contains(&note.chance) {
                    let new = if note.chance.is_nan() { 1.0 } else { note.chance.clamp(0.0, 1.0) };
                    report.record(MigrationAction::Clamped, format!("{}.chance", npath), json!(note.chance), json!(new), "outside 0..=1");
                    note.chance = new;
                }
                if !(note.accent > 0.0 && note.accent.is_finite()) {
                    report.record(MigrationAction::Clamped, format!("{}.accent", npath), json!(note.accent), json!(1.0), "accent must be > 0");
                    note.accent = 1.0;
                }
                kept.push(note);
            }
            pattern.notes = kept;
        }

        if track.clips.len() > MAX_CLIPS_PER_TRACK {
            report.record(MigrationAction::Dropped, format!("{}.clips", path), json!(track.clips.len()), json!(MAX_CLIPS_PER_TRACK), "too many clips");
            track.clips.truncate(MAX_CLIPS_PER_TRACK);
        }

        let patterns = &track.patterns;
        let mut kept = Vec::with_capacity(track.clips.len());
        for (ci, mut clip) in std::mem::take(&mut track.clips).into_iter().enumerate() {
            let cpath = format!("{}.clips[{}]", path, ci);
            let Some(pattern) = patterns.get(&clip.pattern) else {
                report.record(
                    MigrationAction::DroppedReference,
                    cpath,
                    json!(clip.pattern),
                    Value::Null,
                    format!("pattern '{}' does not exist on track {}", clip.pattern, ti),
                );
                continue;
            };
            clamp_tick(&mut report, format!("{}.start_tick", cpath), &mut clip.start_tick, 0, MAX_TICK);
            if clip.repeats == 0 {
                report.record(MigrationAction::Clamped, format!("{}.repeats", cpath), json!(0), json!(1), "repeats must be >= 1");
                clip.repeats = 1;
            }
            if clip.end_tick(pattern.length_ticks) > MAX_TICK {
                report.record(
                    MigrationAction::Dropped,
                    cpath,
                    json!(clip.start_tick),
                    Value::Null,
                    format!("clip ends past {}", MAX_TICK),
                );
                continue;
            }
            kept.push(clip);
        }
        track.clips = kept;
    }

    // Sections: sorted by start, empty and overlapping ones removed.
    let sorted = project.sections.windows(2).all(|w| w[0].start_bar <= w[1].start_bar);
    if !sorted {
        report.record(MigrationAction::Clamped, "sections", Value::Null, Value::Null, "sections sorted by start bar");
        project.sections.sort_by_key(|s| s.start_bar);
    }
    let mut kept: Vec<crate::project::Section> = Vec::with_capacity(project.sections.len());
    for (si, section) in std::mem::take(&mut project.sections).into_iter().enumerate() {
        let overlap = kept.last().is_some_and(|prev| prev.overlaps(&section));
        if section.length_bars == 0 || overlap {
            report.record(
                MigrationAction::Dropped,
                format!("sections[{}]", si),
                json!(section.name),
                Value::Null,
                if overlap { "overlaps previous section" } else { "section has no length" },
            );
            continue;
        }
        kept.push(section);
    }
    project.sections = kept;

    report
}

/// Parses, migrates and repairs a persisted project.
///
/// Fails only when the text is not JSON or its shape cannot be read as a
/// project after migration.
pub fn load_project_str(text: &str) -> Result<(Project, MigrationReport), SpecError> {
    let mut doc: Value = serde_json::from_str(text)?;
    let mut report = MigrationReport::default();
    migrate_document(&mut doc, &mut report)?;
    let mut project: Project = serde_json::from_value(doc)?;
    let typed = validate_and_migrate(&mut project);
    report.merge(typed);
    Ok((project, report))
}

/// Serializes a project in its persisted form.
pub fn to_json_pretty(project: &Project) -> Result<String, SpecError> {
    Ok(serde_json::to_string_pretty(project)?)
}
