//! Named song sections.

use serde::{Deserialize, Serialize};

/// A labelled bar range. Sections are kept sorted and never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub start_bar: u32,
    pub length_bars: u32,
}

impl Section {
    pub fn new(name: impl Into<String>, start_bar: u32, length_bars: u32) -> Self {
        Self {
            name: name.into(),
            start_bar,
            length_bars,
        }
    }

    /// Exclusive end bar.
    pub fn end_bar(&self) -> u32 {
        self.start_bar.saturating_add(self.length_bars)
    }

    pub fn overlaps(&self, other: &Section) -> bool {
        self.start_bar < other.end_bar() && other.start_bar < self.end_bar()
    }
}
