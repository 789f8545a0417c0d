//! Name-based bus inference.
//!
//! Tracks without an explicit bus are routed by keyword. Precedence is
//! drums, then bass, then vox; anything else lands on `music`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The default busses a track can be inferred onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusId {
    Drums,
    Bass,
    Vox,
    Music,
}

impl BusId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusId::Drums => "drums",
            BusId::Bass => "bass",
            BusId::Vox => "vox",
            BusId::Music => "music",
        }
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DRUM_TOKENS: &[&str] = &[
    "drum", "perc", "kick", "snare", "clap", "hat", "hh", "ride", "cym", "tom", "shaker", "rim",
];
const BASS_TOKENS: &[&str] = &["bass", "sub", "808"];
const VOX_TOKENS: &[&str] = &["vocal", "vox", "voice", "choir"];

fn has_any(name: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| name.contains(t))
}

/// Infers a bus from a track name by case-insensitive substring match.
pub fn infer_bus(name: &str) -> BusId {
    let n = name.trim().to_lowercase();
    if has_any(&n, DRUM_TOKENS) {
        BusId::Drums
    } else if has_any(&n, BASS_TOKENS) {
        BusId::Bass
    } else if has_any(&n, VOX_TOKENS) {
        BusId::Vox
    } else {
        BusId::Music
    }
}

/// Resolves a role name (e.g. `"kick"`) to a track index.
///
/// The first track whose name contains the role wins. For `kick` the first
/// track inferred onto the drums bus is the fallback.
pub fn pick_role_source<'a, I>(names: I, role: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let role = role.trim().to_lowercase();
    let mut drums_fallback = None;
    for (i, name) in names.into_iter().enumerate() {
        let n = name.to_lowercase();
        if n.contains(&role) {
            return Some(i);
        }
        if drums_fallback.is_none() && infer_bus(&n) == BusId::Drums {
            drums_fallback = Some(i);
        }
    }
    if role == "kick" {
        drums_fallback
    } else {
        None
    }
}
