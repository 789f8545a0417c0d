//! The headless command language.
//!
//! A script is one command per line. `#` starts a comment line and blank
//! lines are ignored. Arguments are positional words or `key=value`
//! options; double quotes keep spaces inside a word.
//!
//! ```text
//! new_project demo 96
//! add_track Drums
//! set_kit 0 punchy
//! new_pattern 0 main 1:0
//! add_note_pat 0 main kick 0 0:0:120
//! place_pattern 0 main 0 4
//! include "mix/master.txt"
//! export_mp3 preset=demo
//! ```
//!
//! Lines are parsed into [`Command`] values and executed by a [`Session`].
//! The [`Interpreter`] drives a run: strict runs stop at the first error,
//! other runs record a warning and continue, and dry runs skip exports.

pub mod command;
pub mod exec;
pub mod interp;
pub mod token;

#[cfg(test)]
mod tests;

pub use command::{Command, ExportKind, ExportOpts, MixTarget, TimeArg};
pub use exec::{sanitize_name, Session};
pub use interp::{Applied, Interpreter, RunOptions, RunReport, RunState};
