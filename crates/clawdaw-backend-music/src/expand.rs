//! Expansion of clips into concrete timed note events.
//!
//! Per note occurrence the order is: mute and chance filtering, swing on
//! the start tick, accent, drum-role layering, then per-track humanize over
//! the sorted result. Notes are never rewritten in the project.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use clawdaw_spec::derived::song_length_ticks;
use clawdaw_spec::time::apply_swing;
use clawdaw_spec::{Mixer, NoteKey, Project, Region, Tick, Track, TrackMode};

use crate::error::{MusicError, MusicResult};
use crate::rng::{chance_passes, stream_rng, track_seed};

/// One sounding note on an absolute tick timeline.
///
/// Field order is the sort order of a track's events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteEvent {
    pub start_tick: Tick,
    pub pitch: u8,
    pub end_tick: Tick,
    pub velocity: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub glide_ticks: Tick,
}

fn is_zero(v: &Tick) -> bool {
    *v == 0
}

/// The expanded events of one track plus what a renderer needs to voice it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEvents {
    pub index: usize,
    pub name: String,
    pub channel: u8,
    pub mode: TrackMode,
    pub mixer: Mixer,
    pub bus: String,
    pub events: Vec<NoteEvent>,
}

impl TrackEvents {
    /// GM program for instrument tracks.
    pub fn program(&self) -> Option<u8> {
        match self.mode {
            TrackMode::GmInstrument { program } => Some(program),
            _ => None,
        }
    }
}

/// The note-event expansion of a whole project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStream {
    pub name: String,
    pub bpm: f64,
    pub ppq: u32,
    pub beats_per_bar: u32,
    /// Length of the rendered timeline in ticks.
    pub length_ticks: Tick,
    pub tracks: Vec<TrackEvents>,
}

impl EventStream {
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }
}

/// Which part of the timeline to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionSelect {
    /// The project's render region when set, else everything.
    #[default]
    Project,
    Full,
    Explicit(Region),
}

/// Which tracks to expand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackSelect {
    /// Soloed tracks if any track is soloed, else every unmuted track.
    #[default]
    Audible,
    All,
    Only(BTreeSet<usize>),
}

/// Expansion switches. All effects are on by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandOptions {
    pub swing: bool,
    pub chance: bool,
    pub humanize: bool,
    pub region: RegionSelect,
    pub tracks: TrackSelect,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            swing: true,
            chance: true,
            humanize: true,
            region: RegionSelect::default(),
            tracks: TrackSelect::default(),
        }
    }
}

/// Indices of the tracks that sound under mute/solo.
pub fn audible_tracks(project: &Project) -> BTreeSet<usize> {
    let soloed: BTreeSet<usize> = project
        .tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.solo)
        .map(|(i, _)| i)
        .collect();
    if !soloed.is_empty() {
        return soloed;
    }
    project
        .tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.mute)
        .map(|(i, _)| i)
        .collect()
}

/// Expands the selected tracks of `project`.
pub fn expand_project(project: &Project, options: &ExpandOptions) -> MusicResult<EventStream> {
    let selected = match &options.tracks {
        TrackSelect::Audible => audible_tracks(project),
        TrackSelect::All => (0..project.tracks.len()).collect(),
        TrackSelect::Only(set) => {
            if let Some(&bad) = set.iter().find(|&&i| i >= project.tracks.len()) {
                return Err(MusicError::TrackOutOfRange {
                    track: bad,
                    count: project.tracks.len(),
                });
            }
            set.clone()
        }
    };

    let region = match options.region {
        RegionSelect::Project => project.render_region,
        RegionSelect::Full => None,
        RegionSelect::Explicit(r) => Some(r),
    };

    let mut tracks = Vec::with_capacity(selected.len());
    for index in selected {
        let track = &project.tracks[index];
        let mut events = expand_track_events(project, index, track, options);
        if let Some(r) = region {
            events = slice_region(&events, r);
        }
        tracks.push(TrackEvents {
            index,
            name: track.name.clone(),
            channel: track.channel,
            mode: track.mode.clone(),
            mixer: track.mixer,
            bus: track.effective_bus(),
            events,
        });
    }

    let length_ticks = match region {
        Some(r) => r.end - r.start,
        None => tracks
            .iter()
            .flat_map(|t| t.events.iter().map(|e| e.end_tick))
            .max()
            .unwrap_or(0)
            .max(song_length_ticks(project)),
    };

    Ok(EventStream {
        name: project.name.clone(),
        bpm: project.bpm,
        ppq: project.ppq,
        beats_per_bar: project.time_signature.beats_per_bar,
        length_ticks,
        tracks,
    })
}

/// Expands one track over the whole timeline.
pub fn expand_track(
    project: &Project,
    index: usize,
    options: &ExpandOptions,
) -> MusicResult<Vec<NoteEvent>> {
    let track = project
        .tracks
        .get(index)
        .ok_or(MusicError::TrackOutOfRange {
            track: index,
            count: project.tracks.len(),
        })?;
    Ok(expand_track_events(project, index, track, options))
}

fn expand_track_events(
    project: &Project,
    index: usize,
    track: &Track,
    options: &ExpandOptions,
) -> Vec<NoteEvent> {
    let seed = track_seed(track.humanize.seed, index);
    let kit = track.kit();
    let mut events = Vec::new();

    for clip in &track.clips {
        let Some(pattern) = track.patterns.get(&clip.pattern) else {
            continue;
        };
        for rep in 0..clip.repeats {
            let base = clip.start_tick + Tick::from(rep) * pattern.length_ticks;
            for note in &pattern.notes {
                if note.mute {
                    continue;
                }
                let at = base + note.start_tick;
                if options.chance && !chance_passes(seed, at, &note.pitch, note.chance) {
                    continue;
                }
                let start_tick = if options.swing {
                    apply_swing(at, project.ppq, project.swing)
                } else {
                    at
                };
                let end_tick = start_tick + note.dur_ticks;
                let velocity = note.effective_velocity();
                let glide_ticks = if note.glide_ticks > 0 {
                    note.glide_ticks
                } else {
                    track.glide_ticks
                };

                match note.pitch {
                    NoteKey::Pitch(pitch) => events.push(NoteEvent {
                        start_tick,
                        pitch,
                        end_tick,
                        velocity,
                        glide_ticks,
                    }),
                    NoteKey::Role(role) => {
                        for layer in kit.layers(role) {
                            let v = (f64::from(velocity) * layer.vel_mul).round();
                            events.push(NoteEvent {
                                start_tick,
                                pitch: layer.pitch,
                                end_tick,
                                velocity: v.clamp(1.0, 127.0) as u8,
                                glide_ticks,
                            });
                        }
                    }
                }
            }
        }
    }

    events.sort();
    if options.humanize && track.humanize.is_active() {
        humanize(&mut events, track, seed);
    }
    events
}

/// Jitters start and velocity within the track's humanize bounds. Starts
/// never go negative, durations are kept, velocity stays in `1..=127`.
fn humanize(events: &mut [NoteEvent], track: &Track, seed: u64) {
    let mut rng = stream_rng(seed, "humanize");
    let timing = track.humanize.timing;
    let velocity = i32::from(track.humanize.velocity);
    for event in events.iter_mut() {
        let dt = if timing > 0 {
            rng.gen_range(-timing..=timing)
        } else {
            0
        };
        let dv = if velocity > 0 {
            rng.gen_range(-velocity..=velocity)
        } else {
            0
        };
        let duration = event.end_tick - event.start_tick;
        event.start_tick = (event.start_tick + dt).max(0);
        event.end_tick = event.start_tick + duration;
        event.velocity = (i32::from(event.velocity) + dv).clamp(1, 127) as u8;
    }
    events.sort();
}

/// Keeps events intersecting `region`, trimmed to it and shifted so the
/// region starts at tick 0. Trimmed events last at least one tick.
pub fn slice_region(events: &[NoteEvent], region: Region) -> Vec<NoteEvent> {
    events
        .iter()
        .filter(|e| e.start_tick < region.end && e.end_tick > region.start)
        .map(|e| {
            let start = e.start_tick.max(region.start) - region.start;
            let end = e.end_tick.min(region.end) - region.start;
            NoteEvent {
                start_tick: start,
                end_tick: end.max(start + 1),
                ..e.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests;
