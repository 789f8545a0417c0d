//! Tracks and their instrument configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::clip::Clip;
use super::pattern::Pattern;
use crate::bus::infer_bus;
use crate::drumkit::{DrumKit, DEFAULT_KIT};
use crate::time::Tick;

/// Built-in sampler voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    Drums,
    #[serde(rename = "808")]
    Bass808,
}

impl SamplerKind {
    pub fn parse(text: &str) -> Option<SamplerKind> {
        match text.trim().to_lowercase().as_str() {
            "drums" => Some(SamplerKind::Drums),
            "808" => Some(SamplerKind::Bass808),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerKind::Drums => "drums",
            SamplerKind::Bass808 => "808",
        }
    }
}

fn default_preset() -> String {
    "default".to_string()
}

/// How a track produces sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackMode {
    /// A General MIDI program played by the external synthesizer.
    GmInstrument { program: u8 },
    /// A built-in deterministic sampler.
    Sampler {
        sampler: SamplerKind,
        #[serde(default = "default_preset")]
        preset: String,
    },
    /// A native offline instrument plugin.
    InstrumentPlugin {
        id: String,
        #[serde(default = "default_preset")]
        preset: String,
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
        #[serde(default)]
        seed: u64,
    },
}

impl Default for TrackMode {
    fn default() -> Self {
        TrackMode::GmInstrument { program: 0 }
    }
}

impl TrackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackMode::GmInstrument { .. } => "gm_instrument",
            TrackMode::Sampler { .. } => "sampler",
            TrackMode::InstrumentPlugin { .. } => "instrument_plugin",
        }
    }
}

/// Mixer parameters, each `0..=127`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mixer {
    pub volume: u8,
    pub pan: u8,
    pub reverb: u8,
    pub chorus: u8,
}

impl Default for Mixer {
    fn default() -> Self {
        Self {
            volume: 100,
            pan: 64,
            reverb: 0,
            chorus: 0,
        }
    }
}

/// Names one field of [`Mixer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerParam {
    Volume,
    Pan,
    Reverb,
    Chorus,
}

impl MixerParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            MixerParam::Volume => "volume",
            MixerParam::Pan => "pan",
            MixerParam::Reverb => "reverb",
            MixerParam::Chorus => "chorus",
        }
    }
}

impl fmt::Display for MixerParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Mixer {
    pub fn get(&self, param: MixerParam) -> u8 {
        match param {
            MixerParam::Volume => self.volume,
            MixerParam::Pan => self.pan,
            MixerParam::Reverb => self.reverb,
            MixerParam::Chorus => self.chorus,
        }
    }

    pub fn set(&mut self, param: MixerParam, value: u8) {
        match param {
            MixerParam::Volume => self.volume = value,
            MixerParam::Pan => self.pan = value,
            MixerParam::Reverb => self.reverb = value,
            MixerParam::Chorus => self.chorus = value,
        }
    }
}

/// Deterministic timing/velocity jitter applied at render time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Humanize {
    /// Maximum timing offset in ticks, `<= ppq / 8`.
    pub timing: Tick,
    /// Maximum velocity offset, `<= 30`.
    pub velocity: u8,
    pub seed: u64,
}

impl Humanize {
    pub fn is_active(&self) -> bool {
        self.timing > 0 || self.velocity > 0
    }
}

fn default_kit() -> String {
    DEFAULT_KIT.name().to_string()
}

/// A track. Its index is its position in the project's track list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    /// MIDI channel, `0..=15`.
    pub channel: u8,
    #[serde(default)]
    pub mode: TrackMode,
    #[serde(default = "default_kit")]
    pub drum_kit: String,
    #[serde(default)]
    pub glide_ticks: Tick,
    #[serde(default)]
    pub humanize: Humanize,
    #[serde(default)]
    pub mixer: Mixer,
    /// Explicit bus; inferred from the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub patterns: BTreeMap<String, Pattern>,
    #[serde(default)]
    pub clips: Vec<Clip>,
    /// Fields this version does not know, preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Track {
    pub fn new(name: impl Into<String>, channel: u8, mode: TrackMode) -> Self {
        Self {
            name: name.into(),
            channel,
            mode,
            drum_kit: default_kit(),
            glide_ticks: 0,
            humanize: Humanize::default(),
            mixer: Mixer::default(),
            bus: None,
            mute: false,
            solo: false,
            patterns: BTreeMap::new(),
            clips: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// The bus this track feeds: explicit assignment, else inferred.
    pub fn effective_bus(&self) -> String {
        match &self.bus {
            Some(bus) => bus.clone(),
            None => infer_bus(&self.name).as_str().to_string(),
        }
    }

    /// The track's drum kit, falling back to the default for unknown names.
    pub fn kit(&self) -> DrumKit {
        DrumKit::resolve(&self.drum_kit).unwrap_or(DEFAULT_KIT)
    }

    /// Exclusive end tick of the last clip, ignoring dangling clips.
    pub fn end_tick(&self) -> Tick {
        self.clips
            .iter()
            .filter_map(|c| {
                self.patterns
                    .get(&c.pattern)
                    .map(|p| c.end_tick(p.length_ticks))
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_is_internally_tagged() {
        let mode = TrackMode::Sampler {
            sampler: SamplerKind::Bass808,
            preset: "dist".into(),
        };
        let json = serde_json::to_value(&mode).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "sampler", "sampler": "808", "preset": "dist"})
        );
    }

    #[test]
    fn effective_bus_prefers_explicit() {
        let mut t = Track::new("Kick", 0, TrackMode::default());
        assert_eq!(t.effective_bus(), "drums");
        t.bus = Some("music".into());
        assert_eq!(t.effective_bus(), "music");
    }

    #[test]
    fn unknown_track_fields_survive() {
        let json = serde_json::json!({
            "name": "pad",
            "channel": 2,
            "color": "teal"
        });
        let t: Track = serde_json::from_value(json).unwrap();
        assert_eq!(t.extra.get("color"), Some(&serde_json::json!("teal")));
        let back = serde_json::to_value(&t).unwrap();
        assert_eq!(back["color"], "teal");
    }
}
