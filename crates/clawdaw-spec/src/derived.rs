//! Timing facts derived from a project's final state.

use serde::Serialize;

use crate::project::Project;
use crate::time::Tick;

/// Song length and friends, computed from clips alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedFacts {
    pub song_length_ticks: Tick,
    pub song_length_seconds: f64,
    pub song_bars_estimate: f64,
}

/// Exclusive end of the last clip on any track. Dangling clips are ignored.
pub fn song_length_ticks(project: &Project) -> Tick {
    project.tracks.iter().map(|t| t.end_tick()).max().unwrap_or(0)
}

pub fn song_length_seconds(project: &Project) -> f64 {
    let ticks = song_length_ticks(project) as f64;
    if project.bpm <= 0.0 || project.ppq == 0 {
        return 0.0;
    }
    ticks / f64::from(project.ppq) * 60.0 / project.bpm
}

pub fn song_bars_estimate(project: &Project) -> f64 {
    let per_bar = project.time_base().ticks_per_bar();
    if per_bar <= 0 {
        return 0.0;
    }
    song_length_ticks(project) as f64 / per_bar as f64
}

impl DerivedFacts {
    pub fn of(project: &Project) -> Self {
        Self {
            song_length_ticks: song_length_ticks(project),
            song_length_seconds: song_length_seconds(project),
            song_bars_estimate: song_bars_estimate(project),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Clip, TrackMode};

    #[test]
    fn facts_follow_last_clip() {
        let mut p = Project::new("len", 120.0);
        let t = p.add_track("keys", TrackMode::default()).unwrap();
        p.new_pattern(t, "a", 1920).unwrap();
        p.place_clip(t, "a", 1920, 3).unwrap();
        // dangling clips never extend the song
        p.tracks[t].clips.push(Clip::new("gone", 100_000, 1));

        let facts = DerivedFacts::of(&p);
        assert_eq!(facts.song_length_ticks, 7680);
        assert_eq!(facts.song_bars_estimate, 4.0);
        assert!((facts.song_length_seconds - 8.0).abs() < 1e-9);
    }

    #[test]
    fn empty_project_is_zero_length() {
        let facts = DerivedFacts::of(&Project::new("empty", 90.0));
        assert_eq!(facts.song_length_ticks, 0);
        assert_eq!(facts.song_length_seconds, 0.0);
    }
}
