//! Mix spec document types.
//!
//! The mix spec describes FX per scope (track, bus, master), sends,
//! sidechain ducking and bus routing. It only describes processing; the
//! mix compiler turns it into an ordered plan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// EQ band shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqKind {
    #[serde(alias = "peaking")]
    Bell,
    LowShelf,
    HighShelf,
}

impl Default for EqKind {
    fn default() -> Self {
        EqKind::Bell
    }
}

fn default_q() -> f64 {
    1.0
}

/// One parametric EQ band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    #[serde(default, rename = "type")]
    pub kind: EqKind,
    /// Centre frequency in Hz.
    pub f: f64,
    #[serde(default = "default_q")]
    pub q: f64,
    /// Gain in dB.
    #[serde(default)]
    pub g: f64,
}

/// Dynamics parameters shared by gate, expander and compressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dynamics {
    pub threshold_db: f64,
    #[serde(default = "Dynamics::default_ratio")]
    pub ratio: f64,
    #[serde(default = "Dynamics::default_attack")]
    pub attack_ms: f64,
    #[serde(default = "Dynamics::default_release")]
    pub release_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub makeup_db: Option<f64>,
}

impl Dynamics {
    fn default_ratio() -> f64 {
        2.0
    }
    fn default_attack() -> f64 {
        5.0
    }
    fn default_release() -> f64 {
        50.0
    }

    pub fn new(threshold_db: f64) -> Self {
        Self {
            threshold_db,
            ratio: Self::default_ratio(),
            attack_ms: Self::default_attack(),
            release_ms: Self::default_release(),
            makeup_db: None,
        }
    }
}

/// Soft-clip curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatKind {
    Tanh,
    Atan,
    Cubic,
    Clip,
}

impl SatKind {
    pub fn parse(text: &str) -> Option<SatKind> {
        match text.trim().to_lowercase().as_str() {
            "tanh" => Some(SatKind::Tanh),
            "atan" => Some(SatKind::Atan),
            "cubic" => Some(SatKind::Cubic),
            "clip" => Some(SatKind::Clip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SatKind::Tanh => "tanh",
            SatKind::Atan => "atan",
            SatKind::Cubic => "cubic",
            SatKind::Clip => "clip",
        }
    }
}

impl Default for SatKind {
    fn default() -> Self {
        SatKind::Tanh
    }
}

fn default_drive() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saturation {
    #[serde(default, rename = "type")]
    pub kind: SatKind,
    #[serde(default = "default_drive")]
    pub drive: f64,
}

fn default_width() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stereo {
    #[serde(default = "default_width")]
    pub width: f64,
}

/// Transient shaper amounts, each in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transient {
    #[serde(default)]
    pub attack: f64,
    #[serde(default)]
    pub sustain: f64,
}

/// FX available in every scope. Stage order is fixed by the compiler, not
/// by field order in the document; EQ bands keep their declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FxChain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highpass_hz: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eq: Vec<EqBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lowpass_hz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<Dynamics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expander: Option<Dynamics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp: Option<Dynamics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<Saturation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereo: Option<Stereo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<Transient>,
}

/// Per-track mix entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMix {
    #[serde(flatten)]
    pub fx: FxChain,
    /// Send level per bus name, each in `[0, 1]`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sends: BTreeMap<String, f64>,
}

/// Effect a bus applies when used as a send return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnFx {
    Reverb {
        #[serde(default = "ReturnFx::default_reverb_decay")]
        decay: f64,
        #[serde(default)]
        predelay_ms: f64,
    },
    Delay {
        #[serde(default = "ReturnFx::default_delay_ms")]
        ms: f64,
        #[serde(default = "ReturnFx::default_delay_decay")]
        decay: f64,
    },
}

impl ReturnFx {
    fn default_reverb_decay() -> f64 {
        0.35
    }
    fn default_delay_ms() -> f64 {
        240.0
    }
    fn default_delay_decay() -> f64 {
        0.25
    }

    pub fn reverb() -> Self {
        ReturnFx::Reverb {
            decay: Self::default_reverb_decay(),
            predelay_ms: 0.0,
        }
    }

    pub fn delay() -> Self {
        ReturnFx::Delay {
            ms: Self::default_delay_ms(),
            decay: Self::default_delay_decay(),
        }
    }
}

/// Per-bus mix entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusMix {
    #[serde(flatten)]
    pub fx: FxChain,
    #[serde(default, rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_fx: Option<ReturnFx>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mono_below_hz: Option<f64>,
    /// Downstream bus; master when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn default_limit() -> f64 {
    0.98
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limiter {
    #[serde(default = "default_limit")]
    pub limit: f64,
}

/// Master scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterMix {
    #[serde(flatten)]
    pub fx: FxChain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<Limiter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mono_below_hz: Option<f64>,
}

/// Sidechain key source: a track index or a role resolved by track name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SidechainSource {
    Track(usize),
    Role(String),
}

impl std::fmt::Display for SidechainSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SidechainSource::Track(i) => write!(f, "{}", i),
            SidechainSource::Role(r) => write!(f, "{}", r),
        }
    }
}

impl SidechainSource {
    /// Track index named by this source. A role that spells a number names
    /// that index.
    pub fn track_index(&self) -> Option<usize> {
        match self {
            SidechainSource::Track(i) => Some(*i),
            SidechainSource::Role(role) => role.trim().parse().ok(),
        }
    }

    /// Role to resolve by track name, when the source is not an index.
    pub fn role_name(&self) -> Option<&str> {
        match self {
            SidechainSource::Role(role) if self.track_index().is_none() => Some(role),
            _ => None,
        }
    }
}

/// Ducks `dst` by the level of `src`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidechainSpec {
    pub src: SidechainSource,
    pub dst: usize,
    #[serde(default = "SidechainSpec::default_threshold")]
    pub threshold_db: f64,
    #[serde(default = "SidechainSpec::default_ratio")]
    pub ratio: f64,
    #[serde(default = "SidechainSpec::default_attack")]
    pub attack_ms: f64,
    #[serde(default = "SidechainSpec::default_release")]
    pub release_ms: f64,
}

impl SidechainSpec {
    fn default_threshold() -> f64 {
        -24.0
    }
    fn default_ratio() -> f64 {
        6.0
    }
    fn default_attack() -> f64 {
        5.0
    }
    fn default_release() -> f64 {
        120.0
    }

    pub fn new(src: SidechainSource, dst: usize) -> Self {
        Self {
            src,
            dst,
            threshold_db: Self::default_threshold(),
            ratio: Self::default_ratio(),
            attack_ms: Self::default_attack(),
            release_ms: Self::default_release(),
        }
    }
}

/// The whole mix description.
///
/// Track entries are keyed by the decimal track index, matching the
/// persisted JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tracks: BTreeMap<String, TrackMix>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidechain: Vec<SidechainSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub busses: BTreeMap<String, BusMix>,
    #[serde(default)]
    pub master: MasterMix,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MixSpec {
    pub fn track(&self, index: usize) -> Option<&TrackMix> {
        self.tracks.get(&index.to_string())
    }

    /// Entry for `index`, created empty if missing.
    pub fn track_mut(&mut self, index: usize) -> &mut TrackMix {
        self.tracks.entry(index.to_string()).or_default()
    }

    pub fn bus_mut(&mut self, name: &str) -> &mut BusMix {
        self.busses.entry(name.to_string()).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
            && self.sidechain.is_empty()
            && self.busses.is_empty()
            && self.master == MasterMix::default()
    }

    /// Rewrites track references after `removed` was deleted: its entries
    /// go away and higher indices shift down by one.
    pub fn reindex_after_delete(&mut self, removed: usize) {
        let old = std::mem::take(&mut self.tracks);
        for (key, entry) in old {
            match key.parse::<usize>() {
                Ok(i) if i == removed => {}
                Ok(i) if i > removed => {
                    self.tracks.insert((i - 1).to_string(), entry);
                }
                _ => {
                    self.tracks.insert(key, entry);
                }
            }
        }

        self.sidechain
            .retain(|sc| sc.dst != removed && sc.src.track_index() != Some(removed));
        for sc in &mut self.sidechain {
            if sc.dst > removed {
                sc.dst -= 1;
            }
            if let Some(src) = sc.src.track_index() {
                let src = if src > removed { src - 1 } else { src };
                sc.src = SidechainSource::Track(src);
            }
        }
    }
}
