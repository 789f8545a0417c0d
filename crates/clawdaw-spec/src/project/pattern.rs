//! Patterns and notes.

use serde::{Deserialize, Serialize};

use crate::drumkit::DrumRole;
use crate::error::CoreError;
use crate::limits::{MAX_NOTES_PER_PATTERN, MAX_TICK};
use crate::time::Tick;

/// What a note plays: a MIDI pitch or a drum role resolved through the
/// track's kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteKey {
    Pitch(u8),
    Role(DrumRole),
}

impl NoteKey {
    /// Parses `36` or a role name such as `kick`/`hh`.
    pub fn parse(token: &str) -> Result<NoteKey, CoreError> {
        let t = token.trim();
        if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) {
            return match t.parse::<u8>() {
                Ok(p) if p <= 127 => Ok(NoteKey::Pitch(p)),
                _ => Err(CoreError::range(format!("pitch {} outside 0..=127", t))),
            };
        }
        DrumRole::parse(t)
            .map(NoteKey::Role)
            .ok_or_else(|| CoreError::syntax(format!("'{}' is neither a pitch nor a drum role", t)))
    }
}

fn default_velocity() -> u8 {
    100
}

fn default_one() -> f64 {
    1.0
}

fn is_one(v: &f64) -> bool {
    *v == 1.0
}

fn is_zero(v: &Tick) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A note inside a pattern. Times are relative to the pattern start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: NoteKey,
    pub start_tick: Tick,
    pub dur_ticks: Tick,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    /// Probability in `[0, 1]` that the note sounds.
    #[serde(default = "default_one", skip_serializing_if = "is_one")]
    pub chance: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mute: bool,
    /// Velocity multiplier, `> 0`.
    #[serde(default = "default_one", skip_serializing_if = "is_one")]
    pub accent: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub glide_ticks: Tick,
}

impl Note {
    pub fn new(pitch: NoteKey, start_tick: Tick, dur_ticks: Tick, velocity: u8) -> Self {
        Self {
            pitch,
            start_tick,
            dur_ticks,
            velocity,
            chance: 1.0,
            mute: false,
            accent: 1.0,
            glide_ticks: 0,
        }
    }

    pub fn end_tick(&self) -> Tick {
        self.start_tick + self.dur_ticks
    }

    /// Velocity after accent, clamped to `1..=127`.
    pub fn effective_velocity(&self) -> u8 {
        let v = (f64::from(self.velocity) * self.accent).round();
        v.clamp(1.0, 127.0) as u8
    }

    /// Checks every bound a note must satisfy inside a pattern of `length`.
    pub fn check(&self, length: Tick) -> Result<(), CoreError> {
        if let NoteKey::Pitch(p) = self.pitch {
            if p > 127 {
                return Err(CoreError::range(format!("pitch {} outside 0..=127", p)));
            }
        }
        if self.start_tick < 0 || self.start_tick >= length {
            return Err(CoreError::range(format!(
                "note start {} outside pattern [0, {})",
                self.start_tick, length
            )));
        }
        if self.dur_ticks <= 0 || self.dur_ticks > MAX_TICK {
            return Err(CoreError::range(format!(
                "note duration {} must be in 1..={}",
                self.dur_ticks, MAX_TICK
            )));
        }
        if !(1..=127).contains(&self.velocity) {
            return Err(CoreError::range(format!(
                "velocity {} outside 1..=127",
                self.velocity
            )));
        }
        if !(0.0..=1.0).contains(&self.chance) {
            return Err(CoreError::range(format!(
                "chance {} outside 0..=1",
                self.chance
            )));
        }
        if !(self.accent > 0.0 && self.accent.is_finite()) {
            return Err(CoreError::range(format!("accent {} must be > 0", self.accent)));
        }
        if self.glide_ticks < 0 {
            return Err(CoreError::range("glide_ticks must be >= 0"));
        }
        Ok(())
    }
}

/// A reusable, named sequence of notes. The name is the key in the owning
/// track's pattern map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub length_ticks: Tick,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Pattern {
    pub fn new(length_ticks: Tick) -> Self {
        Self {
            length_ticks,
            notes: Vec::new(),
        }
    }

    pub fn add_note(&mut self, note: Note) -> Result<(), CoreError> {
        if self.notes.len() >= MAX_NOTES_PER_PATTERN {
            return Err(CoreError::range(format!(
                "pattern already holds {} notes",
                MAX_NOTES_PER_PATTERN
            )));
        }
        note.check(self.length_ticks)?;
        self.notes.push(note);
        Ok(())
    }

    /// Transposes pitched notes. Role notes are unaffected. Fails without
    /// changing anything if a pitch would leave `0..=127`.
    pub fn transpose(&mut self, semitones: i32) -> Result<(), CoreError> {
        let mut pitches = Vec::with_capacity(self.notes.len());
        for note in &self.notes {
            if let NoteKey::Pitch(p) = note.pitch {
                let shifted = i32::from(p) + semitones;
                if !(0..=127).contains(&shifted) {
                    return Err(CoreError::range(format!(
                        "transposing pitch {} by {} leaves 0..=127",
                        p, semitones
                    )));
                }
                pitches.push(Some(shifted as u8));
            } else {
                pitches.push(None);
            }
        }
        for (note, pitch) in self.notes.iter_mut().zip(pitches) {
            if let Some(p) = pitch {
                note.pitch = NoteKey::Pitch(p);
            }
        }
        Ok(())
    }

    /// Rotates notes by `delta` ticks, wrapping at the pattern length.
    pub fn shift(&mut self, delta: Tick) {
        let len = self.length_ticks;
        for note in &mut self.notes {
            note.start_tick = (note.start_tick + delta).rem_euclid(len);
        }
        self.sort_notes();
    }

    /// Scales the pattern length and every note time by `factor`.
    pub fn stretch(&mut self, factor: f64) -> Result<(), CoreError> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(CoreError::range(format!(
                "stretch factor {} must be > 0",
                factor
            )));
        }
        let scale = |t: Tick| (t as f64 * factor).round() as Tick;
        let length = scale(self.length_ticks).max(1);
        if length > MAX_TICK {
            return Err(CoreError::range(format!(
                "stretched length {} exceeds {}",
                length, MAX_TICK
            )));
        }
        self.length_ticks = length;
        for note in &mut self.notes {
            note.start_tick = scale(note.start_tick).min(length - 1);
            note.dur_ticks = scale(note.dur_ticks).max(1);
        }
        Ok(())
    }

    /// Mirrors note positions around the pattern length.
    pub fn reverse(&mut self) {
        let len = self.length_ticks;
        for note in &mut self.notes {
            note.start_tick = (len - note.end_tick()).clamp(0, len - 1);
        }
        self.sort_notes();
    }

    /// Scales every velocity by `factor`, clamped to `1..=127`.
    pub fn velocity_scale(&mut self, factor: f64) -> Result<(), CoreError> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(CoreError::range(format!(
                "velocity scale {} must be > 0",
                factor
            )));
        }
        for note in &mut self.notes {
            let v = (f64::from(note.velocity) * factor).round().clamp(1.0, 127.0);
            note.velocity = v as u8;
        }
        Ok(())
    }

    fn sort_notes(&mut self) {
        self.notes.sort_by_key(|n| {
            let key = match n.pitch {
                NoteKey::Pitch(p) => (0u8, p),
                NoteKey::Role(r) => (1u8, r as u8),
            };
            (n.start_tick, key)
        });
    }
}
