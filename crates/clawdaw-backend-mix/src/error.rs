//! Error types for mix compilation.

use thiserror::Error;

use clawdaw_spec::{BackendError, ErrorKind};

use crate::graph::Node;

/// Errors that can occur while compiling a mix spec.
///
/// Reference errors are reported per edge; a compile collects all of them
/// in one pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixError {
    /// A `tracks` key that is not a track index.
    #[error("mix entry '{key}' is not a track index")]
    InvalidTrackKey { key: String },

    /// A mix entry or sidechain names a track that does not exist.
    #[error("{context} references track {track}, but the project has {count} track(s)")]
    MissingTrack {
        context: String,
        track: usize,
        count: usize,
    },

    /// A track sends to a bus the mix spec does not declare.
    #[error("track {track} sends to undeclared bus '{bus}'")]
    UnknownSendBus { track: usize, bus: String },

    /// A bus routes into a bus that neither the mix spec nor any track declares.
    #[error("bus '{bus}' routes to unknown bus '{output}'")]
    UnknownOutputBus { bus: String, output: String },

    /// A sidechain role no track name resolves to.
    #[error("sidechain role '{role}' matches no track")]
    UnresolvedRole { role: String },

    /// A track sidechaining itself.
    #[error("track {track} cannot sidechain itself")]
    SelfSidechain { track: usize },

    /// A parameter outside its documented range.
    #[error("{scope}: {param} = {value} is out of range ({expected})")]
    OutOfRange {
        scope: String,
        param: &'static str,
        value: f64,
        expected: &'static str,
    },

    /// The dependency graph contains a cycle through this edge.
    #[error("routing cycle through edge {from} -> {to}")]
    Cycle { from: Node, to: Node },
}

impl MixError {
    pub fn out_of_range(
        scope: impl Into<String>,
        param: &'static str,
        value: f64,
        expected: &'static str,
    ) -> Self {
        MixError::OutOfRange {
            scope: scope.into(),
            param,
            value,
            expected,
        }
    }
}

impl BackendError for MixError {
    fn code(&self) -> &'static str {
        match self {
            MixError::InvalidTrackKey { .. } => "MIX_001",
            MixError::MissingTrack { .. } => "MIX_002",
            MixError::UnknownSendBus { .. } => "MIX_003",
            MixError::UnknownOutputBus { .. } => "MIX_004",
            MixError::UnresolvedRole { .. } => "MIX_005",
            MixError::SelfSidechain { .. } => "MIX_006",
            MixError::OutOfRange { .. } => "MIX_007",
            MixError::Cycle { .. } => "MIX_008",
        }
    }

    fn category(&self) -> &'static str {
        "mix"
    }

    fn kind(&self) -> ErrorKind {
        match self {
            MixError::InvalidTrackKey { .. } => ErrorKind::Syntax,
            MixError::MissingTrack { .. }
            | MixError::UnknownSendBus { .. }
            | MixError::UnknownOutputBus { .. }
            | MixError::UnresolvedRole { .. } => ErrorKind::Reference,
            MixError::OutOfRange { .. } => ErrorKind::Range,
            MixError::SelfSidechain { .. } | MixError::Cycle { .. } => ErrorKind::Compile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_the_edge() {
        let err = MixError::Cycle {
            from: Node::Track(1),
            to: Node::Track(0),
        };
        assert_eq!(err.to_string(), "routing cycle through edge track:1 -> track:0");
        assert_eq!(err.code(), "MIX_008");
        assert_eq!(err.kind(), ErrorKind::Compile);
    }

    #[test]
    fn reference_errors_are_reference_kind() {
        let err = MixError::UnknownSendBus {
            track: 0,
            bus: "plate".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert_eq!(err.category(), "mix");
    }
}
