//! clawdaw project model
//!
//! This crate provides the types, validation, migration and hashing for
//! clawdaw projects. A project is a JSON document describing tracks,
//! reusable patterns, clip placements, song sections and a mix tree on an
//! integer tick grid.
//!
//! # Example
//!
//! ```
//! use clawdaw_spec::{Note, NoteKey, Project, TrackMode};
//! use clawdaw_spec::validation::validate_project;
//! use clawdaw_spec::hash::canonical_project_hash;
//!
//! let mut project = Project::new("demo", 120.0);
//! let drums = project.add_track("drums", TrackMode::default()).unwrap();
//! project.new_pattern(drums, "main", 1920).unwrap();
//! project
//!     .add_note_to_pattern(drums, "main", Note::new(NoteKey::parse("kick").unwrap(), 0, 120, 110))
//!     .unwrap();
//! project.place_clip(drums, "main", 0, 4).unwrap();
//!
//! assert!(validate_project(&project).is_ok());
//! println!("project hash: {}", canonical_project_hash(&project).unwrap());
//! ```
//!
//! # Modules
//!
//! - [`time`]: tick grid, time parsing and formatting, swing
//! - [`project`]: the project model and its atomic mutation primitives
//! - [`mix`]: mix spec document types
//! - [`arrangement`]: arrangement spec document types
//! - [`validation`]: structural validation, reference analysis, migration
//! - [`derived`]: song length facts
//! - [`hash`]: canonical hashing and seed derivation
//! - [`drumkit`], [`gm`], [`bus`]: built-in tables

pub mod arrangement;
pub mod bus;
pub mod derived;
pub mod drumkit;
pub mod error;
pub mod gm;
pub mod hash;
pub mod limits;
pub mod mix;
pub mod project;
pub mod time;
pub mod validation;

pub use arrangement::{ArrangeSpec, Cue, CueEdge, CueKind, SectionSpec, ARRANGE_SPEC_VERSION};
pub use bus::{infer_bus, pick_role_source, BusId};
pub use derived::DerivedFacts;
pub use drumkit::{DrumKit, DrumLayer, DrumRole, DEFAULT_KIT};
pub use error::{
    BackendError, CoreError, ErrorCode, ErrorKind, GenerationError, SpecError, ValidationError,
    ValidationResult, ValidationWarning, WarningCode,
};
pub use mix::{
    BusMix, Dynamics, EqBand, EqKind, FxChain, Limiter, MasterMix, MixSpec, ReturnFx, SatKind,
    Saturation, SidechainSource, SidechainSpec, Stereo, TrackMix, Transient,
};
pub use project::{
    Clip, Humanize, Mixer, MixerParam, Note, NoteKey, Pattern, Project, Region, SamplerKind,
    Section, Track, TrackMode, SCHEMA_VERSION,
};
pub use time::{format_time, parse_time, Tick, TimeBase, TimeSignature, TimeSyntaxError, PPQ};
