//! clawdaw Arrangement Backend
//!
//! Compiles an arrangement spec (ordered sections, each with dropout/fill
//! cues at its edges) into concrete sections and clip placements for a
//! project.
//!
//! Each track loops one base pattern across the whole song; cues then
//! remove or swap clips whose span intersects the cue window. Failures are
//! collected per track and per cue so one bad cue does not hide the others,
//! but a result with any error is never applied.
//!
//! # Example
//!
//! ```ignore
//! use clawdaw_backend_arrange::{apply_arrangement, load_arrange_spec};
//!
//! let spec = load_arrange_spec(Path::new("song.yaml"))?;
//! let compiled = apply_arrangement(&mut project, &spec)?;
//! println!("placed {} clips", compiled.clip_count());
//! ```

pub mod compile;
pub mod error;
pub mod load;

pub use compile::{
    apply_arrangement, compile_arrangement, default_base_pattern, CompiledArrangement,
    PREFERRED_BASE_PATTERNS,
};
pub use error::ArrangeError;
pub use load::{check_arrange_spec, load_arrange_spec, parse_arrange_spec, SpecFormat};
