//! Drum roles and built-in drum kits.
//!
//! Notes may name a drum role instead of a MIDI pitch. A kit maps each role
//! to one or more `(pitch, velocity multiplier)` layers; expansion happens
//! at render time using the owning track's kit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of symbolic drum roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumRole {
    Kick,
    Snare,
    Clap,
    Rim,
    HatClosed,
    HatOpen,
    HatPedal,
    TomLow,
    TomMid,
    TomHigh,
    Crash,
    Ride,
    Perc,
    Shaker,
}

impl DrumRole {
    pub const ALL: [DrumRole; 14] = [
        DrumRole::Kick,
        DrumRole::Snare,
        DrumRole::Clap,
        DrumRole::Rim,
        DrumRole::HatClosed,
        DrumRole::HatOpen,
        DrumRole::HatPedal,
        DrumRole::TomLow,
        DrumRole::TomMid,
        DrumRole::TomHigh,
        DrumRole::Crash,
        DrumRole::Ride,
        DrumRole::Perc,
        DrumRole::Shaker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrumRole::Kick => "kick",
            DrumRole::Snare => "snare",
            DrumRole::Clap => "clap",
            DrumRole::Rim => "rim",
            DrumRole::HatClosed => "hat_closed",
            DrumRole::HatOpen => "hat_open",
            DrumRole::HatPedal => "hat_pedal",
            DrumRole::TomLow => "tom_low",
            DrumRole::TomMid => "tom_mid",
            DrumRole::TomHigh => "tom_high",
            DrumRole::Crash => "crash",
            DrumRole::Ride => "ride",
            DrumRole::Perc => "perc",
            DrumRole::Shaker => "shaker",
        }
    }

    /// Parses a role name, accepting the common shorthand aliases
    /// (`bd`, `sd`, `hh`, `oh`, ...). Case, `-` and spaces are normalized.
    pub fn parse(text: &str) -> Option<DrumRole> {
        let norm = normalize_name(text);
        let canonical = match norm.as_str() {
            "bd" | "k" => "kick",
            "sd" | "s" => "snare",
            "hh" | "ch" | "hat" | "hihat" => "hat_closed",
            "oh" => "hat_open",
            "ph" => "hat_pedal",
            "rc" => "ride",
            "cr" => "crash",
            "tomlo" => "tom_low",
            "tomm" => "tom_mid",
            "tomhi" => "tom_high",
            other => other,
        };
        DrumRole::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == canonical)
    }
}

impl fmt::Display for DrumRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrumRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DrumRole::parse(s).ok_or_else(|| format!("unknown drum role '{}'", s))
    }
}

/// One MIDI note produced by a role hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumLayer {
    pub pitch: u8,
    pub vel_mul: f64,
}

macro_rules! layer {
    ($pitch:expr, $mul:expr) => {
        DrumLayer {
            pitch: $pitch,
            vel_mul: $mul,
        }
    };
}

/// A built-in drum kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumKit {
    TrapHard,
    HouseClean,
    BoombapDusty,
    GmBasic,
}

/// Kit used when a track names none.
pub const DEFAULT_KIT: DrumKit = DrumKit::TrapHard;

impl DrumKit {
    pub const ALL: [DrumKit; 4] = [
        DrumKit::BoombapDusty,
        DrumKit::GmBasic,
        DrumKit::HouseClean,
        DrumKit::TrapHard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DrumKit::TrapHard => "trap_hard",
            DrumKit::HouseClean => "house_clean",
            DrumKit::BoombapDusty => "boombap_dusty",
            DrumKit::GmBasic => "gm_basic",
        }
    }

    /// Resolves a kit name or alias (`default`, `gm`, `basic`).
    pub fn resolve(name: &str) -> Option<DrumKit> {
        let norm = normalize_name(name);
        let canonical = match norm.as_str() {
            "default" => "trap_hard",
            "gm" | "basic" => "gm_basic",
            other => other,
        };
        DrumKit::ALL.iter().copied().find(|k| k.name() == canonical)
    }

    /// Layers for `role` in this kit. Every kit covers every role.
    pub fn layers(&self, role: DrumRole) -> &'static [DrumLayer] {
        use DrumRole::*;

        const KICK_TRAP: &[DrumLayer] = &[layer!(36, 1.0), layer!(35, 0.55)];
        const SNARE_TRAP: &[DrumLayer] = &[layer!(38, 1.0), layer!(40, 0.65)];
        const CLAP_TRAP: &[DrumLayer] = &[layer!(39, 1.0), layer!(38, 0.35)];

        match (self, role) {
            (DrumKit::TrapHard, Kick) => KICK_TRAP,
            (DrumKit::TrapHard, Snare) => SNARE_TRAP,
            (DrumKit::TrapHard, Clap) => CLAP_TRAP,

            (DrumKit::HouseClean, Kick) => &[layer!(36, 1.0), layer!(35, 0.35)],
            (DrumKit::HouseClean, Snare) => &[layer!(39, 0.85), layer!(38, 0.55)],
            (DrumKit::HouseClean, Crash) => &[layer!(57, 1.0)],
            (DrumKit::HouseClean, Perc) => &[layer!(75, 1.0)],
            (DrumKit::HouseClean, Shaker) => &[layer!(70, 1.0)],

            (DrumKit::BoombapDusty, Kick) => &[layer!(36, 1.0), layer!(35, 0.70)],
            (DrumKit::BoombapDusty, Snare) => &[layer!(38, 1.0), layer!(54, 0.40)],
            (DrumKit::BoombapDusty, Clap) => &[layer!(39, 0.75), layer!(38, 0.30)],
            (DrumKit::BoombapDusty, Perc) => &[layer!(58, 1.0)],

            (_, Kick) => &[layer!(36, 1.0)],
            (_, Snare) => &[layer!(38, 1.0)],
            (_, Clap) => &[layer!(39, 1.0)],
            (_, Rim) => &[layer!(37, 1.0)],
            (_, HatClosed) => &[layer!(42, 1.0)],
            (_, HatOpen) => &[layer!(46, 1.0)],
            (_, HatPedal) => &[layer!(44, 1.0)],
            (_, TomLow) => &[layer!(45, 1.0)],
            (_, TomMid) => &[layer!(47, 1.0)],
            (_, TomHigh) => &[layer!(50, 1.0)],
            (_, Crash) => &[layer!(49, 1.0)],
            (_, Ride) => &[layer!(51, 1.0)],
            (_, Perc) => &[layer!(56, 1.0)],
            (_, Shaker) => &[layer!(82, 1.0)],
        }
    }
}

impl fmt::Display for DrumKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize_name(text: &str) -> String {
    text.trim().to_lowercase().replace(['-', ' '], "_")
}
