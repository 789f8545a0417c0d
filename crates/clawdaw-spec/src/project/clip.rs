//! Clip placements.

use serde::{Deserialize, Serialize};

use crate::time::Tick;

fn default_repeats() -> u32 {
    1
}

/// A placement of a pattern on its track's timeline.
///
/// A clip occupies `[start_tick, start_tick + repeats * pattern.length_ticks)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub pattern: String,
    pub start_tick: Tick,
    #[serde(default = "default_repeats")]
    pub repeats: u32,
}

impl Clip {
    pub fn new(pattern: impl Into<String>, start_tick: Tick, repeats: u32) -> Self {
        Self {
            pattern: pattern.into(),
            start_tick,
            repeats,
        }
    }

    /// Exclusive end tick for a pattern of `pattern_len` ticks.
    pub fn end_tick(&self, pattern_len: Tick) -> Tick {
        self.start_tick + Tick::from(self.repeats) * pattern_len
    }

    /// True if `[start, end)` of this clip intersects `[lo, hi)`.
    pub fn overlaps(&self, pattern_len: Tick, lo: Tick, hi: Tick) -> bool {
        self.start_tick < hi && self.end_tick(pattern_len) > lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_half_open() {
        let c = Clip::new("a", 1920, 2);
        assert_eq!(c.end_tick(1920), 5760);
        assert!(c.overlaps(1920, 0, 1921));
        assert!(!c.overlaps(1920, 0, 1920));
        assert!(!c.overlaps(1920, 5760, 7680));
        assert!(c.overlaps(1920, 5759, 7680));
    }

    #[test]
    fn repeats_default_to_one() {
        let c: Clip = serde_json::from_str(r#"{"pattern":"a","start_tick":0}"#).unwrap();
        assert_eq!(c.repeats, 1);
    }
}
