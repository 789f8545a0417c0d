use super::*;
use clawdaw_spec::{Clip, DrumRole, Humanize, Note};
use pretty_assertions::assert_eq;

fn note(key: NoteKey, start: Tick, dur: Tick, vel: u8) -> Note {
    Note::new(key, start, dur, vel)
}

/// One track with a one-beat pattern `p` holding `notes`, looped `repeats` times.
fn project_with(notes: Vec<Note>, repeats: u32) -> Project {
    let mut p = Project::new("t", 120.0);
    let t = p.add_track("lead", TrackMode::default()).unwrap();
    p.new_pattern(t, "p", 480).unwrap();
    for n in notes {
        p.add_note_to_pattern(t, "p", n).unwrap();
    }
    p.place_clip(t, "p", 0, repeats).unwrap();
    p
}

fn starts(events: &[NoteEvent]) -> Vec<Tick> {
    events.iter().map(|e| e.start_tick).collect()
}

#[test]
fn clips_loop_their_pattern() {
    let p = project_with(vec![note(NoteKey::Pitch(60), 0, 100, 90)], 3);
    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(starts(&events), vec![0, 480, 960]);
    assert!(events.iter().all(|e| e.end_tick - e.start_tick == 100));
}

#[test]
fn swing_delays_odd_sixteenths_only_at_expansion() {
    let mut p = project_with(
        vec![
            note(NoteKey::Pitch(60), 0, 60, 90),
            note(NoteKey::Pitch(60), 120, 60, 90),
        ],
        1,
    );
    p.set_swing(50).unwrap();

    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(starts(&events), vec![0, 180]);
    assert_eq!(events[1].end_tick, 240);
    assert_eq!(p.tracks[0].patterns["p"].notes[1].start_tick, 120);

    let straight = ExpandOptions {
        swing: false,
        ..ExpandOptions::default()
    };
    assert_eq!(starts(&expand_track(&p, 0, &straight).unwrap()), vec![0, 120]);
}

#[test]
fn drum_roles_expand_to_kit_layers() {
    let p = project_with(vec![note(NoteKey::Role(DrumRole::Kick), 0, 60, 100)], 1);
    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    let pv: Vec<(u8, u8)> = events.iter().map(|e| (e.pitch, e.velocity)).collect();
    assert_eq!(pv, vec![(35, 55), (36, 100)]);
}

#[test]
fn kit_choice_changes_layers() {
    let mut p = project_with(vec![note(NoteKey::Role(DrumRole::Kick), 0, 60, 100)], 1);
    p.set_drum_kit(0, "gm").unwrap();
    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].pitch, 36);
}

#[test]
fn accent_scales_and_clamps_velocity() {
    let mut loud = note(NoteKey::Pitch(60), 0, 60, 100);
    loud.accent = 1.5;
    let mut soft = note(NoteKey::Pitch(62), 0, 60, 100);
    soft.accent = 0.5;
    let p = project_with(vec![loud, soft], 1);
    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    let pv: Vec<(u8, u8)> = events.iter().map(|e| (e.pitch, e.velocity)).collect();
    assert_eq!(pv, vec![(60, 127), (62, 50)]);
}

#[test]
fn muted_and_zero_chance_notes_are_silent() {
    let mut muted = note(NoteKey::Pitch(60), 0, 60, 100);
    muted.mute = true;
    let mut never = note(NoteKey::Pitch(62), 0, 60, 100);
    never.chance = 0.0;
    let always = note(NoteKey::Pitch(64), 0, 60, 100);
    let p = project_with(vec![muted, never, always], 1);

    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(events.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![64]);

    let no_chance = ExpandOptions {
        chance: false,
        ..ExpandOptions::default()
    };
    let events = expand_track(&p, 0, &no_chance).unwrap();
    assert_eq!(events.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![62, 64]);
}

#[test]
fn chance_is_reproducible() {
    let mut maybe = note(NoteKey::Pitch(60), 0, 60, 100);
    maybe.chance = 0.5;
    let p = project_with(vec![maybe], 64);
    let a = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    let b = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(a, b);
    assert!(!a.is_empty() && a.len() < 64, "kept {}", a.len());
}

#[test]
fn humanize_is_seeded_and_bounded() {
    let notes: Vec<Note> = (0..8)
        .map(|i| note(NoteKey::Pitch(60), i * 60, 30, 100))
        .collect();
    let mut p = project_with(notes, 4);
    p.set_humanize(
        0,
        Humanize {
            timing: 10,
            velocity: 12,
            seed: 99,
        },
    )
    .unwrap();

    let plain = ExpandOptions {
        humanize: false,
        ..ExpandOptions::default()
    };
    let base = expand_track(&p, 0, &plain).unwrap();
    let a = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    let b = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, base);
    assert_eq!(a.len(), base.len());
    for e in &a {
        assert!(e.start_tick >= 0);
        assert_eq!(e.end_tick - e.start_tick, 30);
        assert!((88..=112).contains(&e.velocity));
    }
    let nearest = |t: Tick| base.iter().map(|e| (e.start_tick - t).abs()).min().unwrap();
    assert!(a.iter().all(|e| nearest(e.start_tick) <= 10));
}

#[test]
fn track_glide_fills_in_for_notes_without_one() {
    let mut gliding = note(NoteKey::Pitch(60), 0, 60, 100);
    gliding.glide_ticks = 30;
    let p = {
        let mut p = project_with(vec![gliding, note(NoteKey::Pitch(62), 120, 60, 100)], 1);
        p.set_glide(0, 90).unwrap();
        p
    };
    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(
        events.iter().map(|e| e.glide_ticks).collect::<Vec<_>>(),
        vec![30, 90]
    );
}

#[test]
fn dangling_clips_are_skipped() {
    let mut p = project_with(vec![note(NoteKey::Pitch(60), 0, 60, 100)], 1);
    p.tracks[0].clips.push(Clip::new("ghost", 480, 1));
    let events = expand_track(&p, 0, &ExpandOptions::default()).unwrap();
    assert_eq!(starts(&events), vec![0]);
}

#[test]
fn solo_overrides_mute() {
    let mut p = Project::new("t", 120.0);
    for name in ["a", "b", "c"] {
        p.add_track(name, TrackMode::default()).unwrap();
    }
    p.tracks[1].mute = true;
    assert_eq!(audible_tracks(&p).into_iter().collect::<Vec<_>>(), vec![0, 2]);
    p.tracks[2].solo = true;
    p.tracks[1].solo = true;
    assert_eq!(audible_tracks(&p).into_iter().collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn render_region_trims_and_rebases() {
    let mut p = project_with(vec![note(NoteKey::Pitch(60), 0, 300, 100)], 4);
    p.set_render_region(600, 1200).unwrap();

    let stream = expand_project(&p, &ExpandOptions::default()).unwrap();
    assert_eq!(stream.length_ticks, 600);
    let spans: Vec<(Tick, Tick)> = stream.tracks[0]
        .events
        .iter()
        .map(|e| (e.start_tick, e.end_tick))
        .collect();
    // Occurrences at 480 and 960 intersect [600, 1200).
    assert_eq!(spans, vec![(0, 180), (360, 600)]);

    let full = ExpandOptions {
        region: RegionSelect::Full,
        ..ExpandOptions::default()
    };
    let stream = expand_project(&p, &full).unwrap();
    assert_eq!(stream.event_count(), 4);
    assert_eq!(stream.length_ticks, 1920);
}

#[test]
fn explicit_track_selection_is_checked() {
    let p = project_with(Vec::new(), 1);
    let options = ExpandOptions {
        tracks: TrackSelect::Only([0, 3].into_iter().collect()),
        ..ExpandOptions::default()
    };
    let err = expand_project(&p, &options).unwrap_err();
    assert!(matches!(err, MusicError::TrackOutOfRange { track: 3, count: 1 }));
    assert!(expand_track(&p, 5, &ExpandOptions::default()).is_err());
}

#[test]
fn stream_carries_voicing() {
    let mut p = project_with(vec![note(NoteKey::Pitch(40), 0, 60, 100)], 1);
    p.set_program(0, 33).unwrap();
    let stream = expand_project(&p, &ExpandOptions::default()).unwrap();
    let t = &stream.tracks[0];
    assert_eq!(t.program(), Some(33));
    assert_eq!(t.bus, "music");
    assert_eq!(stream.ppq, 480);
    assert_eq!(stream.beats_per_bar, 4);
}
