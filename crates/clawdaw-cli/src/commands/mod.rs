//! Subcommand implementations

pub mod arrange;
pub mod hash;
pub mod mix;
pub mod run;
pub mod validate;
