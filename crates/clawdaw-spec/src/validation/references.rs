//! Pattern reference analysis.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::project::Project;

/// A clip whose pattern is missing from its track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingPattern {
    pub track: usize,
    pub clip: usize,
    pub pattern: String,
}

/// A pattern no clip places.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnusedPattern {
    pub track: usize,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceReport {
    pub missing: Vec<MissingPattern>,
    pub unused: Vec<UnusedPattern>,
}

impl ReferenceReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unused.is_empty()
    }
}

/// Finds dangling clips and never-placed patterns, in track order.
pub fn analyze_references(project: &Project) -> ReferenceReport {
    let mut report = ReferenceReport::default();
    for (ti, track) in project.tracks.iter().enumerate() {
        let mut used = BTreeSet::new();
        for (ci, clip) in track.clips.iter().enumerate() {
            if track.patterns.contains_key(&clip.pattern) {
                used.insert(clip.pattern.as_str());
            } else {
                report.missing.push(MissingPattern {
                    track: ti,
                    clip: ci,
                    pattern: clip.pattern.clone(),
                });
            }
        }
        for name in track.patterns.keys() {
            if !used.contains(name.as_str()) {
                report.unused.push(UnusedPattern {
                    track: ti,
                    pattern: name.clone(),
                });
            }
        }
    }
    report
}
