//! Hard limits on project size.
//!
//! These bound memory and render cost for scripted projects. Mutation
//! primitives reject anything past them; migration truncates.

use crate::time::Tick;

/// One track per MIDI channel.
pub const MAX_TRACKS: usize = 16;
pub const MAX_PATTERNS_PER_TRACK: usize = 128;
pub const MAX_CLIPS_PER_TRACK: usize = 2048;
pub const MAX_NOTES_PER_PATTERN: usize = 8192;
pub const MAX_SECTIONS: usize = 256;

/// Latest tick any clip, note, or region may reach.
pub const MAX_TICK: Tick = 10_000_000;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 400.0;
pub const MAX_SWING: u8 = 75;
pub const MIN_PPQ: u32 = 24;
pub const MAX_PPQ: u32 = 1920;
pub const MAX_HUMANIZE_VELOCITY: u8 = 30;
