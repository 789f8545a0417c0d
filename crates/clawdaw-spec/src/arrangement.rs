//! Arrangement spec document types.
//!
//! ```yaml
//! version: 1
//! base_patterns: {0: drums_main, 1: bass_main}
//! sections:
//!   - name: intro
//!     bars: 4
//!     cues:
//!       - {type: dropout, at: end, bars: 1, tracks: [1]}
//!       - {type: fill, at: end, bars: 1, tracks: [0], pattern: drums_fill}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Only arrangement spec version understood by the compiler.
pub const ARRANGE_SPEC_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueKind {
    /// Remove matched clips.
    Dropout,
    /// Swap matched clips to another pattern.
    Fill,
}

/// Section edge a cue window is anchored to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueEdge {
    Start,
    #[default]
    End,
}

fn default_one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    #[serde(rename = "type")]
    pub kind: CueKind,
    #[serde(default)]
    pub at: CueEdge,
    #[serde(default = "default_one")]
    pub bars: u32,
    #[serde(default)]
    pub tracks: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub bars: u32,
    #[serde(default)]
    pub cues: Vec<Cue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangeSpec {
    #[serde(default = "default_one")]
    pub version: u32,
    #[serde(default)]
    pub seed: u64,
    /// Base loop pattern per track index.
    #[serde(
        default,
        deserialize_with = "de_index_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub base_patterns: BTreeMap<usize, String>,
    pub sections: Vec<SectionSpec>,
}

impl ArrangeSpec {
    /// Total length of all sections in bars.
    pub fn total_bars(&self) -> u64 {
        self.sections.iter().map(|s| u64::from(s.bars)).sum()
    }
}

/// Accepts track-index keys written either as integers or as strings.
fn de_index_map<'de, D>(deserializer: D) -> Result<BTreeMap<usize, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(PartialEq, Eq, PartialOrd, Ord)]
    struct IndexKey(usize);

    impl<'de> Deserialize<'de> for IndexKey {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            struct KeyVisitor;

            impl<'de> Visitor<'de> for KeyVisitor {
                type Value = IndexKey;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a track index")
                }

                fn visit_u64<E: de::Error>(self, v: u64) -> Result<IndexKey, E> {
                    usize::try_from(v)
                        .map(IndexKey)
                        .map_err(|_| E::custom("track index too large"))
                }

                fn visit_i64<E: de::Error>(self, v: i64) -> Result<IndexKey, E> {
                    usize::try_from(v)
                        .map(IndexKey)
                        .map_err(|_| E::custom(format!("invalid track index {}", v)))
                }

                fn visit_str<E: de::Error>(self, v: &str) -> Result<IndexKey, E> {
                    v.trim()
                        .parse::<usize>()
                        .map(IndexKey)
                        .map_err(|_| E::custom(format!("invalid track index '{}'", v)))
                }
            }

            d.deserialize_any(KeyVisitor)
        }
    }

    let raw: BTreeMap<IndexKey, String> = BTreeMap::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k.0, v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_keys_and_defaults() {
        let json = r#"{
            "version": 1,
            "base_patterns": {"0": "main", "2": "groove"},
            "sections": [
                {"name": "intro", "bars": 4, "cues": [{"type": "dropout", "tracks": [1]}]}
            ]
        }"#;
        let spec: ArrangeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.base_patterns.get(&2).map(String::as_str), Some("groove"));
        let cue = &spec.sections[0].cues[0];
        assert_eq!(cue.at, CueEdge::End);
        assert_eq!(cue.bars, 1);
        assert_eq!(spec.total_bars(), 4);
    }
}
