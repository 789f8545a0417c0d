//! The project model and its mutation primitives.
//!
//! Every primitive is atomic: it validates fully before touching state, so
//! an `Err` always leaves the project unchanged.

mod clip;
mod pattern;
mod section;
mod track;


use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use clip::Clip;
pub use pattern::{Note, NoteKey, Pattern};
pub use section::Section;
pub use track::{Humanize, Mixer, MixerParam, SamplerKind, Track, TrackMode};

use crate::drumkit::DrumKit;
use crate::error::CoreError;
use crate::limits::{
    MAX_BPM, MAX_CLIPS_PER_TRACK, MAX_HUMANIZE_VELOCITY, MAX_PATTERNS_PER_TRACK, MAX_SECTIONS,
    MAX_SWING, MAX_TICK, MAX_TRACKS, MIN_BPM,
};
use crate::mix::MixSpec;
use crate::time::{Tick, TimeBase, TimeSignature, PPQ};

/// Current persisted schema version.
pub const SCHEMA_VERSION: u32 = 12;

fn default_ppq() -> u32 {
    PPQ
}

/// A half-open `[start, end)` tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: Tick,
    pub end: Tick,
}

impl Region {
    /// Builds a region, rejecting empty, inverted or out-of-range bounds.
    pub fn new(start: Tick, end: Tick) -> Result<Self, CoreError> {
        if start < 0 || end <= start || end > MAX_TICK {
            return Err(CoreError::range(format!(
                "region [{}, {}) must satisfy 0 <= start < end <= {}",
                start, end, MAX_TICK
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> Tick {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A complete project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub schema_version: u32,
    pub name: String,
    pub bpm: f64,
    #[serde(default = "default_ppq")]
    pub ppq: u32,
    #[serde(default)]
    pub time_signature: TimeSignature,
    /// Percent delay of odd sixteenths, `0..=75`.
    #[serde(default)]
    pub swing: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_region: Option<Region>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub mix: MixSpec,
    /// Fields this version does not know, preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Project {
    pub fn new(name: impl Into<String>, bpm: f64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: name.into(),
            bpm,
            ppq: PPQ,
            time_signature: TimeSignature::default(),
            swing: 0,
            loop_region: None,
            render_region: None,
            tracks: Vec::new(),
            sections: Vec::new(),
            mix: MixSpec::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn time_base(&self) -> TimeBase {
        TimeBase::new(self.ppq, self.time_signature)
    }

    pub fn track(&self, index: usize) -> Result<&Track, CoreError> {
        self.tracks
            .get(index)
            .ok_or_else(|| CoreError::reference(format!("no track at index {}", index)))
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track, CoreError> {
        self.tracks
            .get_mut(index)
            .ok_or_else(|| CoreError::reference(format!("no track at index {}", index)))
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), CoreError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(CoreError::range(format!(
                "bpm {} outside {}..={}",
                bpm, MIN_BPM, MAX_BPM
            )));
        }
        self.bpm = bpm;
        Ok(())
    }

    /// Sets swing. Out-of-range values are rejected here; only migration
    /// clamps.
    pub fn set_swing(&mut self, swing: i64) -> Result<(), CoreError> {
        if !(0..=i64::from(MAX_SWING)).contains(&swing) {
            return Err(CoreError::range(format!(
                "swing {} outside 0..={}",
                swing, MAX_SWING
            )));
        }
        self.swing = swing as u8;
        Ok(())
    }

    pub fn set_loop(&mut self, start: Tick, end: Tick) -> Result<(), CoreError> {
        self.loop_region = Some(Region::new(start, end)?);
        Ok(())
    }

    pub fn set_render_region(&mut self, start: Tick, end: Tick) -> Result<(), CoreError> {
        self.render_region = Some(Region::new(start, end)?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------

    /// Adds a track on the lowest free MIDI channel and returns its index.
    pub fn add_track(&mut self, name: &str, mode: TrackMode) -> Result<usize, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::syntax("track name must not be empty"));
        }
        if self.tracks.len() >= MAX_TRACKS {
            return Err(CoreError::range(format!(
                "project already has {} tracks",
                MAX_TRACKS
            )));
        }
        let channel = (0u8..16)
            .find(|ch| self.tracks.iter().all(|t| t.channel != *ch))
            .ok_or_else(|| CoreError::range("no free MIDI channel"))?;
        self.tracks.push(Track::new(name, channel, mode));
        Ok(self.tracks.len() - 1)
    }

    /// Removes a track with its patterns and clips. Later tracks shift down
    /// one index and mix-spec references are rewritten to match.
    pub fn delete_track(&mut self, index: usize) -> Result<Track, CoreError> {
        self.track(index)?;
        let removed = self.tracks.remove(index);
        self.mix.reindex_after_delete(index);
        Ok(removed)
    }

    pub fn set_mixer(&mut self, index: usize, param: MixerParam, value: i64) -> Result<(), CoreError> {
        let value = u8::try_from(value)
            .ok()
            .filter(|v| *v <= 127)
            .ok_or_else(|| CoreError::range(format!("{} {} outside 0..=127", param, value)))?;
        self.track_mut(index)?.mixer.set(param, value);
        Ok(())
    }

    pub fn set_program(&mut self, index: usize, program: u8) -> Result<(), CoreError> {
        if program > 127 {
            return Err(CoreError::range(format!("program {} outside 0..=127", program)));
        }
        self.track_mut(index)?.mode = TrackMode::GmInstrument { program };
        Ok(())
    }

    /// Switches a track to a sampler voice, or back to GM with `None`.
    pub fn set_sampler(&mut self, index: usize, kind: Option<SamplerKind>) -> Result<(), CoreError> {
        let track = self.track_mut(index)?;
        track.mode = match kind {
            Some(sampler) => {
                let preset = match &track.mode {
                    TrackMode::Sampler { preset, .. } => preset.clone(),
                    _ => "default".to_string(),
                };
                TrackMode::Sampler { sampler, preset }
            }
            None => TrackMode::GmInstrument { program: 0 },
        };
        Ok(())
    }

    /// Sets the preset of a sampler or plugin track.
    pub fn set_preset(&mut self, index: usize, preset: &str) -> Result<(), CoreError> {
        let preset = preset.trim();
        if preset.is_empty() {
            return Err(CoreError::syntax("preset must not be empty"));
        }
        let track = self.track_mut(index)?;
        match &mut track.mode {
            TrackMode::Sampler { preset: p, .. } | TrackMode::InstrumentPlugin { preset: p, .. } => {
                *p = preset.to_string();
                Ok(())
            }
            TrackMode::GmInstrument { .. } => Err(CoreError::reference(format!(
                "track {} is a GM instrument and has no preset",
                index
            ))),
        }
    }

    pub fn set_drum_kit(&mut self, index: usize, kit: &str) -> Result<DrumKit, CoreError> {
        let resolved = DrumKit::resolve(kit)
            .ok_or_else(|| CoreError::range(format!("unknown drum kit '{}'", kit)))?;
        self.track_mut(index)?.drum_kit = resolved.name().to_string();
        Ok(resolved)
    }

    pub fn set_instrument(
        &mut self,
        index: usize,
        id: &str,
        preset: Option<&str>,
        seed: u64,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), CoreError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CoreError::syntax("instrument id must not be empty"));
        }
        self.track_mut(index)?.mode = TrackMode::InstrumentPlugin {
            id: id.to_string(),
            preset: preset.unwrap_or("default").to_string(),
            params,
            seed,
        };
        Ok(())
    }

    pub fn set_glide(&mut self, index: usize, ticks: Tick) -> Result<(), CoreError> {
        let max = 2 * Tick::from(self.ppq);
        if !(0..=max).contains(&ticks) {
            return Err(CoreError::range(format!("glide {} outside 0..={}", ticks, max)));
        }
        self.track_mut(index)?.glide_ticks = ticks;
        Ok(())
    }

    pub fn set_humanize(&mut self, index: usize, humanize: Humanize) -> Result<(), CoreError> {
        let max_timing = Tick::from(self.ppq / 8);
        if !(0..=max_timing).contains(&humanize.timing) {
            return Err(CoreError::range(format!(
                "humanize timing {} outside 0..={}",
                humanize.timing, max_timing
            )));
        }
        if humanize.velocity > MAX_HUMANIZE_VELOCITY {
            return Err(CoreError::range(format!(
                "humanize velocity {} outside 0..={}",
                humanize.velocity, MAX_HUMANIZE_VELOCITY
            )));
        }
        self.track_mut(index)?.humanize = humanize;
        Ok(())
    }

    pub fn set_bus(&mut self, index: usize, bus: Option<&str>) -> Result<(), CoreError> {
        let bus = match bus.map(|b| b.trim().to_lowercase()) {
            Some(b) if b.is_empty() => return Err(CoreError::syntax("bus name must not be empty")),
            other => other,
        };
        self.track_mut(index)?.bus = bus;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn pattern(&self, index: usize, name: &str) -> Result<&Pattern, CoreError> {
        self.track(index)?.patterns.get(name).ok_or_else(|| {
            CoreError::reference(format!("track {} has no pattern '{}'", index, name))
        })
    }

    pub fn new_pattern(&mut self, index: usize, name: &str, length: Tick) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::syntax("pattern name must not be empty"));
        }
        if length <= 0 || length > MAX_TICK {
            return Err(CoreError::range(format!(
                "pattern length {} must be in 1..={}",
                length, MAX_TICK
            )));
        }
        let track = self.track_mut(index)?;
        if track.patterns.contains_key(name) {
            return Err(CoreError::reference(format!(
                "track {} already has pattern '{}'",
                index, name
            )));
        }
        if track.patterns.len() >= MAX_PATTERNS_PER_TRACK {
            return Err(CoreError::range(format!(
                "track {} already has {} patterns",
                index, MAX_PATTERNS_PER_TRACK
            )));
        }
        track.patterns.insert(name.to_string(), Pattern::new(length));
        Ok(())
    }

    pub fn add_note_to_pattern(&mut self, index: usize, name: &str, note: Note) -> Result<(), CoreError> {
        self.pattern(index, name)?;
        let track = self.track_mut(index)?;
        match track.patterns.get_mut(name) {
            Some(pattern) => pattern.add_note(note),
            None => Err(CoreError::reference(format!("no pattern '{}'", name))),
        }
    }

    /// Renames a pattern and retargets every clip that referenced it.
    pub fn rename_pattern(&mut self, index: usize, old: &str, new: &str) -> Result<(), CoreError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(CoreError::syntax("pattern name must not be empty"));
        }
        self.pattern(index, old)?;
        if old == new {
            return Ok(());
        }
        let track = self.track_mut(index)?;
        if track.patterns.contains_key(new) {
            return Err(CoreError::reference(format!(
                "track {} already has pattern '{}'",
                index, new
            )));
        }
        if let Some(pattern) = track.patterns.remove(old) {
            track.patterns.insert(new.to_string(), pattern);
        }
        for clip in track.clips.iter_mut().filter(|c| c.pattern == old) {
            clip.pattern = new.to_string();
        }
        Ok(())
    }

    /// Deep-copies a pattern under a new name.
    pub fn duplicate_pattern(&mut self, index: usize, src: &str, dst: &str) -> Result<(), CoreError> {
        let copy = self.pattern(index, src)?.clone();
        let dst = dst.trim();
        if dst.is_empty() {
            return Err(CoreError::syntax("pattern name must not be empty"));
        }
        let track = self.track_mut(index)?;
        if track.patterns.contains_key(dst) {
            return Err(CoreError::reference(format!(
                "track {} already has pattern '{}'",
                index, dst
            )));
        }
        if track.patterns.len() >= MAX_PATTERNS_PER_TRACK {
            return Err(CoreError::range(format!(
                "track {} already has {} patterns",
                index, MAX_PATTERNS_PER_TRACK
            )));
        }
        track.patterns.insert(dst.to_string(), copy);
        Ok(())
    }

    /// Deletes a pattern and every clip placing it. Returns the number of
    /// clips removed.
    pub fn delete_pattern(&mut self, index: usize, name: &str) -> Result<usize, CoreError> {
        self.pattern(index, name)?;
        let track = self.track_mut(index)?;
        track.patterns.remove(name);
        let before = track.clips.len();
        track.clips.retain(|c| c.pattern != name);
        Ok(before - track.clips.len())
    }

    /// Applies `edit` to a copy of the pattern and commits only on success.
    pub fn transform_pattern<F>(&mut self, index: usize, name: &str, edit: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut Pattern) -> Result<(), CoreError>,
    {
        let mut working = self.pattern(index, name)?.clone();
        edit(&mut working)?;
        for note in &working.notes {
            note.check(working.length_ticks)?;
        }
        let track = self.track_mut(index)?;
        track.patterns.insert(name.to_string(), working);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Clips
    // ------------------------------------------------------------------

    fn check_clip(&self, index: usize, clip: &Clip) -> Result<(), CoreError> {
        let pattern = self.pattern(index, &clip.pattern)?;
        if clip.start_tick < 0 {
            return Err(CoreError::range(format!(
                "clip start {} must be >= 0",
                clip.start_tick
            )));
        }
        if clip.repeats == 0 {
            return Err(CoreError::range("clip repeats must be >= 1"));
        }
        let end = clip
            .start_tick
            .checked_add(Tick::from(clip.repeats).saturating_mul(pattern.length_ticks));
        match end {
            Some(end) if end <= MAX_TICK => Ok(()),
            _ => Err(CoreError::range(format!(
                "clip of '{}' at {} x{} ends past {}",
                clip.pattern, clip.start_tick, clip.repeats, MAX_TICK
            ))),
        }
    }

    /// Places a clip and returns its index in the track's clip list.
    pub fn place_clip(
        &mut self,
        index: usize,
        pattern: &str,
        start: Tick,
        repeats: u32,
    ) -> Result<usize, CoreError> {
        let clip = Clip::new(pattern, start, repeats);
        self.check_clip(index, &clip)?;
        let track = self.track_mut(index)?;
        if track.clips.len() >= MAX_CLIPS_PER_TRACK {
            return Err(CoreError::range(format!(
                "track {} already has {} clips",
                index, MAX_CLIPS_PER_TRACK
            )));
        }
        track.clips.push(clip);
        Ok(track.clips.len() - 1)
    }

    fn clip(&self, index: usize, clip_index: usize) -> Result<&Clip, CoreError> {
        self.track(index)?.clips.get(clip_index).ok_or_else(|| {
            CoreError::reference(format!("track {} has no clip {}", index, clip_index))
        })
    }

    pub fn move_clip(&mut self, index: usize, clip_index: usize, start: Tick) -> Result<(), CoreError> {
        let mut moved = self.clip(index, clip_index)?.clone();
        moved.start_tick = start;
        self.check_clip(index, &moved)?;
        self.track_mut(index)?.clips[clip_index] = moved;
        Ok(())
    }

    pub fn delete_clip(&mut self, index: usize, clip_index: usize) -> Result<Clip, CoreError> {
        self.clip(index, clip_index)?;
        Ok(self.track_mut(index)?.clips.remove(clip_index))
    }

    /// Removes all clips from one track, or from every track.
    pub fn clear_clips(&mut self, index: Option<usize>) -> Result<usize, CoreError> {
        match index {
            Some(i) => {
                let track = self.track_mut(i)?;
                let n = track.clips.len();
                track.clips.clear();
                Ok(n)
            }
            None => Ok(self
                .tracks
                .iter_mut()
                .map(|t| std::mem::take(&mut t.clips).len())
                .sum()),
        }
    }

    /// Copies every clip that starts inside bars `[src_bar, src_bar + bars)`
    /// to the same offset from `dst_bar`.
    ///
    /// Only clip starts are tested; a clip that merely overlaps the window
    /// is not copied. Returns the number of clips copied.
    pub fn copy_bars(
        &mut self,
        src_bar: u32,
        bars: u32,
        dst_bar: u32,
        tracks: Option<&[usize]>,
    ) -> Result<usize, CoreError> {
        if bars == 0 {
            return Err(CoreError::range("copy_bars needs at least one bar"));
        }
        let tb = self.time_base();
        let lo = tb.bars(i64::from(src_bar));
        let hi = tb.bars(i64::from(src_bar) + i64::from(bars));
        let delta = tb.bars(i64::from(dst_bar)) - lo;

        let targets: Vec<usize> = match tracks {
            Some(list) => {
                for &i in list {
                    self.track(i)?;
                }
                list.to_vec()
            }
            None => (0..self.tracks.len()).collect(),
        };

        let mut additions: Vec<(usize, Vec<Clip>)> = Vec::new();
        for &i in &targets {
            let track = self.track(i)?;
            let copies: Vec<Clip> = track
                .clips
                .iter()
                .filter(|c| c.start_tick >= lo && c.start_tick < hi)
                .map(|c| Clip::new(c.pattern.clone(), c.start_tick + delta, c.repeats))
                .collect();
            for clip in &copies {
                self.check_clip(i, clip)?;
            }
            if track.clips.len() + copies.len() > MAX_CLIPS_PER_TRACK {
                return Err(CoreError::range(format!(
                    "copy would exceed {} clips on track {}",
                    MAX_CLIPS_PER_TRACK, i
                )));
            }
            additions.push((i, copies));
        }

        let mut copied = 0;
        for (i, copies) in additions {
            copied += copies.len();
            self.tracks[i].clips.extend(copies);
        }
        Ok(copied)
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    /// Inserts a section in start order. Overlaps are rejected.
    pub fn add_section(&mut self, section: Section) -> Result<(), CoreError> {
        if section.name.trim().is_empty() {
            return Err(CoreError::syntax("section name must not be empty"));
        }
        if section.length_bars == 0 {
            return Err(CoreError::range("section length must be >= 1 bar"));
        }
        if self.sections.len() >= MAX_SECTIONS {
            return Err(CoreError::range(format!(
                "project already has {} sections",
                MAX_SECTIONS
            )));
        }
        if let Some(other) = self.sections.iter().find(|s| s.overlaps(&section)) {
            return Err(CoreError::range(format!(
                "section '{}' overlaps '{}'",
                section.name, other.name
            )));
        }
        let pos = self
            .sections
            .iter()
            .position(|s| s.start_bar > section.start_bar)
            .unwrap_or(self.sections.len());
        self.sections.insert(pos, section);
        Ok(())
    }
}
