//! clawdaw Music Backend
//!
//! Expands a project's clips into concrete, timed note events for the
//! renderer, and writes those events as a Standard MIDI File.
//!
//! Expansion is deterministic: swing, chance, accent, drum-role layering
//! and humanize depend only on the project, with every random decision
//! drawn from PCG32 streams seeded through BLAKE3.
//!
//! # Example
//!
//! ```ignore
//! use clawdaw_backend_music::{expand_project, midi, ExpandOptions};
//!
//! let stream = expand_project(&project, &ExpandOptions::default())?;
//! std::fs::write("song.mid", midi::to_smf_bytes(&stream)?)?;
//! ```

pub mod error;
pub mod expand;
pub mod midi;
pub mod rng;

pub use error::{MusicError, MusicResult};
pub use expand::{
    audible_tracks, expand_project, expand_track, slice_region, EventStream, ExpandOptions,
    NoteEvent, RegionSelect, TrackEvents, TrackSelect,
};
