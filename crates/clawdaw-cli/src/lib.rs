//! clawdaw command interpreter.
//!
//! This crate provides the headless script language, the session that
//! executes it against a project, the renderer boundary, engine
//! configuration and the `clawdaw` subcommands.

pub mod commands;
pub mod config;
pub mod input;
pub mod render;
pub mod script;
