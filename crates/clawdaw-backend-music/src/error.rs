//! Error types for event expansion and MIDI writing.

use thiserror::Error;

use clawdaw_spec::{BackendError, ErrorKind};

/// Result type for music backend operations.
pub type MusicResult<T> = Result<T, MusicError>;

/// Errors that can occur while expanding a project into note events.
#[derive(Debug, Error)]
pub enum MusicError {
    /// A selected track index does not exist.
    #[error("track {track} out of range ({count} track(s))")]
    TrackOutOfRange { track: usize, count: usize },

    /// PPQ cannot be expressed as a MIDI division.
    #[error("ppq {ppq} exceeds the MIDI division limit of 32767")]
    Division { ppq: u32 },

    /// Tempo cannot be expressed as a MIDI tempo.
    #[error("tempo {bpm} BPM cannot be written as a MIDI tempo")]
    Tempo { bpm: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError for MusicError {
    fn code(&self) -> &'static str {
        match self {
            MusicError::TrackOutOfRange { .. } => "MUSIC_001",
            MusicError::Division { .. } => "MUSIC_002",
            MusicError::Tempo { .. } => "MUSIC_003",
            MusicError::Io(_) => "MUSIC_004",
        }
    }

    fn category(&self) -> &'static str {
        "music"
    }

    fn kind(&self) -> ErrorKind {
        match self {
            MusicError::TrackOutOfRange { .. } => ErrorKind::Reference,
            MusicError::Division { .. } | MusicError::Tempo { .. } => ErrorKind::Range,
            MusicError::Io(_) => ErrorKind::RenderFailure,
        }
    }
}
