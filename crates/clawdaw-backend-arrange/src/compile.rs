//! Section/cue compilation into concrete clip placements.
//!
//! Compilation is a pure function of `(project, spec)`. It never looks at
//! the clips a project already has, so compiling twice yields the same clip
//! set and re-applying an arrangement never compounds earlier cues.

use serde::Serialize;
use tracing::debug;

use clawdaw_spec::limits::{MAX_CLIPS_PER_TRACK, MAX_SECTIONS, MAX_TICK};
use clawdaw_spec::{ArrangeSpec, Clip, CueEdge, CueKind, Project, Section, Tick, Track};

use crate::error::ArrangeError;

/// Base pattern names tried in order when the arrangement spec names none.
pub const PREFERRED_BASE_PATTERNS: [&str; 5] = ["main", "a", "A", "p1", "P1"];

/// Result of compiling an arrangement against a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledArrangement {
    pub sections: Vec<Section>,
    /// Clips per track, indexed like `project.tracks`.
    pub clips: Vec<Vec<Clip>>,
    /// Every per-track and per-cue failure, in discovery order.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ArrangeError>,
}

fn serialize_errors<S: serde::Serializer>(errors: &[ArrangeError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(|e| e.to_string()))
}

impl CompiledArrangement {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.iter().map(Vec::len).sum()
    }

    /// Writes sections and clips into `project`.
    ///
    /// Refuses, leaving the project untouched, if compilation recorded any
    /// error or the project's track count changed since compiling.
    pub fn apply_to(&self, project: &mut Project) -> Result<(), ArrangeError> {
        if !self.is_valid() {
            return Err(ArrangeError::Rejected {
                count: self.errors.len(),
            });
        }
        if self.clips.len() != project.tracks.len() {
            return Err(ArrangeError::Rejected { count: 1 });
        }
        project.sections = self.sections.clone();
        for (track, clips) in project.tracks.iter_mut().zip(&self.clips) {
            track.clips = clips.clone();
        }
        Ok(())
    }
}

/// Picks the pattern a track loops when the arrangement spec does not name one.
pub fn default_base_pattern(track: &Track) -> Option<&str> {
    PREFERRED_BASE_PATTERNS
        .iter()
        .copied()
        .find(|name| track.patterns.contains_key(*name))
        .or_else(|| track.patterns.keys().next().map(String::as_str))
}

fn base_loop(
    index: usize,
    track: &Track,
    spec: &ArrangeSpec,
    song_ticks: Tick,
) -> Result<Vec<Clip>, ArrangeError> {
    let name = match spec.base_patterns.get(&index) {
        Some(name) => name.as_str(),
        None => default_base_pattern(track).ok_or(ArrangeError::NoPatterns { track: index })?,
    };
    let pattern = track
        .patterns
        .get(name)
        .ok_or_else(|| ArrangeError::MissingBasePattern {
            track: index,
            pattern: name.to_string(),
        })?;
    let len = pattern.length_ticks;
    if len <= 0 || song_ticks % len != 0 {
        return Err(ArrangeError::LengthMismatch {
            track: index,
            pattern: name.to_string(),
            song_ticks,
            pattern_ticks: len,
        });
    }
    let steps = usize::try_from(song_ticks / len).unwrap_or(usize::MAX);
    if steps > MAX_CLIPS_PER_TRACK {
        return Err(ArrangeError::TooManyClips {
            track: index,
            clips: steps,
        });
    }
    Ok((0..steps)
        .map(|i| Clip::new(name, i as Tick * len, 1))
        .collect())
}

fn clip_len(track: &Track, clip: &Clip) -> Tick {
    track
        .patterns
        .get(&clip.pattern)
        .map_or(0, |p| p.length_ticks)
}

/// Compiles `spec` against `project` without modifying it.
pub fn compile_arrangement(project: &Project, spec: &ArrangeSpec) -> CompiledArrangement {
    let tb = project.time_base();
    let mut errors = Vec::new();

    let mut sections = Vec::with_capacity(spec.sections.len());
    let mut cursor: u32 = 0;
    for s in &spec.sections {
        sections.push(Section::new(s.name.clone(), cursor, s.bars));
        cursor = cursor.saturating_add(s.bars);
    }
    let song_ticks = tb.bars(i64::from(cursor));
    if song_ticks > MAX_TICK || sections.len() > MAX_SECTIONS {
        errors.push(ArrangeError::SongTooLong {
            bars: spec.total_bars(),
        });
        return CompiledArrangement {
            sections,
            clips: vec![Vec::new(); project.tracks.len()],
            errors,
        };
    }

    let mut clips: Vec<Vec<Clip>> = Vec::with_capacity(project.tracks.len());
    for (ti, track) in project.tracks.iter().enumerate() {
        match base_loop(ti, track, spec, song_ticks) {
            Ok(loop_clips) => clips.push(loop_clips),
            Err(e) => {
                errors.push(e);
                clips.push(Vec::new());
            }
        }
    }

    for (section, s) in sections.iter().zip(&spec.sections) {
        let sec_lo = tb.bars(i64::from(section.start_bar));
        let sec_hi = tb.bars(i64::from(section.end_bar()));
        for (ci, cue) in s.cues.iter().enumerate() {
            if cue.bars > section.length_bars {
                errors.push(ArrangeError::CueWindowTooLong {
                    section: section.name.clone(),
                    cue: ci,
                    window_bars: cue.bars,
                    section_bars: section.length_bars,
                });
                continue;
            }
            let win = tb.bars(i64::from(cue.bars));
            let (lo, hi) = match cue.at {
                CueEdge::Start => (sec_lo, sec_lo + win),
                CueEdge::End => (sec_hi - win, sec_hi),
            };

            for &ti in &cue.tracks {
                let Some(track) = project.tracks.get(ti) else {
                    errors.push(ArrangeError::CueTrackOutOfRange {
                        section: section.name.clone(),
                        cue: ci,
                        track: ti,
                    });
                    continue;
                };
                let track_clips = &mut clips[ti];
                match cue.kind {
                    CueKind::Dropout => {
                        track_clips.retain(|c| !c.overlaps(clip_len(track, c), lo, hi));
                    }
                    CueKind::Fill => {
                        let fill = cue.pattern.as_deref().unwrap_or_default();
                        if !track.patterns.contains_key(fill) {
                            errors.push(ArrangeError::FillPatternMissing {
                                section: section.name.clone(),
                                cue: ci,
                                track: ti,
                                pattern: fill.to_string(),
                            });
                            continue;
                        }
                        for clip in track_clips.iter_mut() {
                            if clip.overlaps(clip_len(track, clip), lo, hi) {
                                clip.pattern = fill.to_string();
                            }
                        }
                    }
                }
            }
        }
    }

    let compiled = CompiledArrangement {
        sections,
        clips,
        errors,
    };
    debug!(
        sections = compiled.sections.len(),
        clips = compiled.clip_count(),
        errors = compiled.errors.len(),
        "compiled arrangement"
    );
    compiled
}

/// Compiles and applies in one step. On any compile error the project is
/// left unchanged and the full error list is returned.
pub fn apply_arrangement(
    project: &mut Project,
    spec: &ArrangeSpec,
) -> Result<CompiledArrangement, Vec<ArrangeError>> {
    let compiled = compile_arrangement(project, spec);
    if !compiled.is_valid() {
        return Err(compiled.errors);
    }
    compiled.apply_to(project).map_err(|e| vec![e])?;
    Ok(compiled)
}
