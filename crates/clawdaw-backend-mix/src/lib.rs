//! clawdaw Mix Backend
//!
//! Compiles a project's mix spec into an ordered processing plan. The
//! compiler never touches audio: it resolves references, checks ranges,
//! builds the dependency graph (tracks into busses into master, sends into
//! return busses, sidechain sources into ducked tracks) and schedules it
//! topologically. A cycle is a compile error naming one of its edges.
//!
//! # Example
//!
//! ```ignore
//! use clawdaw_backend_mix::compile_project_mix;
//!
//! let plan = compile_project_mix(&project)?;
//! for node in &plan.schedule {
//!     println!("{}", node);
//! }
//! let filter_complex = plan.to_filtergraph();
//! ```

pub mod compile;
pub mod error;
pub mod filtergraph;
pub mod graph;
pub mod stage;

pub use compile::{compile_mix, compile_project_mix, BusPlan, MasterPlan, MixPlan, TrackPlan};
pub use error::MixError;
pub use graph::{DependencyGraph, Edge, EdgeKind, Node};
pub use stage::{chain_stages, Stage};
