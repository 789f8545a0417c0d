//! Error types for arrangement loading and compilation.

use thiserror::Error;

use clawdaw_spec::{BackendError, ErrorKind};

/// Errors that can occur while loading or compiling an arrangement spec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrangeError {
    #[error("cannot read arrangement spec '{path}': {message}")]
    Read { path: String, message: String },
    #[error("malformed arrangement spec: {message}")]
    Parse { message: String },
    #[error("unsupported arrangement spec version {version}")]
    UnsupportedVersion { version: u32 },
    #[error("arrangement spec has no sections")]
    NoSections,
    #[error("section '{section}' must span at least one bar")]
    EmptySection { section: String },
    #[error("cue {cue} in section '{section}' is invalid: {message}")]
    InvalidCue {
        section: String,
        cue: usize,
        message: String,
    },
    #[error("song of {bars} bars exceeds the tick range")]
    SongTooLong { bars: u64 },
    #[error("track {track} has no patterns to loop")]
    NoPatterns { track: usize },
    #[error("track {track} has no base pattern '{pattern}'")]
    MissingBasePattern { track: usize, pattern: String },
    #[error(
        "song length ({song_ticks} ticks) is not a multiple of pattern '{pattern}' length ({pattern_ticks}) on track {track}"
    )]
    LengthMismatch {
        track: usize,
        pattern: String,
        song_ticks: i64,
        pattern_ticks: i64,
    },
    #[error("track {track} would need {clips} clips")]
    TooManyClips { track: usize, clips: usize },
    #[error("cue {cue} in section '{section}': window of {window_bars} bars exceeds section length of {section_bars} bars")]
    CueWindowTooLong {
        section: String,
        cue: usize,
        window_bars: u32,
        section_bars: u32,
    },
    #[error("cue {cue} in section '{section}': track index {track} out of range")]
    CueTrackOutOfRange {
        section: String,
        cue: usize,
        track: usize,
    },
    #[error("cue {cue} in section '{section}': track {track} has no fill pattern '{pattern}'")]
    FillPatternMissing {
        section: String,
        cue: usize,
        track: usize,
        pattern: String,
    },
    #[error("arrangement has {count} compile error(s); project left unchanged")]
    Rejected { count: usize },
}

impl BackendError for ArrangeError {
    fn code(&self) -> &'static str {
        match self {
            ArrangeError::Read { .. } => "ARRANGE_001",
            ArrangeError::Parse { .. } => "ARRANGE_002",
            ArrangeError::UnsupportedVersion { .. } => "ARRANGE_003",
            ArrangeError::NoSections => "ARRANGE_004",
            ArrangeError::EmptySection { .. } => "ARRANGE_005",
            ArrangeError::InvalidCue { .. } => "ARRANGE_006",
            ArrangeError::SongTooLong { .. } => "ARRANGE_007",
            ArrangeError::NoPatterns { .. } => "ARRANGE_008",
            ArrangeError::MissingBasePattern { .. } => "ARRANGE_009",
            ArrangeError::LengthMismatch { .. } => "ARRANGE_010",
            ArrangeError::TooManyClips { .. } => "ARRANGE_011",
            ArrangeError::CueWindowTooLong { .. } => "ARRANGE_012",
            ArrangeError::CueTrackOutOfRange { .. } => "ARRANGE_013",
            ArrangeError::FillPatternMissing { .. } => "ARRANGE_014",
            ArrangeError::Rejected { .. } => "ARRANGE_015",
        }
    }

    fn category(&self) -> &'static str {
        "arrange"
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ArrangeError::Read { .. } => ErrorKind::Reference,
            ArrangeError::Parse { .. } | ArrangeError::InvalidCue { .. } => ErrorKind::Syntax,
            ArrangeError::UnsupportedVersion { .. } => ErrorKind::Range,
            _ => ErrorKind::Compile,
        }
    }
}
