//! Processing stages and their fixed order within a scope.

use serde::Serialize;

use clawdaw_spec::{Dynamics, EqBand, EqKind, FxChain, ReturnFx, Saturation, Transient};

/// One processing step of a track, bus or master chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Gain {
        db: f64,
    },
    Highpass {
        hz: f64,
    },
    Eq(EqBand),
    Lowpass {
        hz: f64,
    },
    Gate(Dynamics),
    Expander(Dynamics),
    Compressor(Dynamics),
    /// Ducking keyed by another track's output.
    Duck {
        source: usize,
        threshold_db: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
    },
    Saturation(Saturation),
    Stereo {
        width: f64,
    },
    Transient(Transient),
    Send {
        bus: String,
        level: f64,
    },
    Return(ReturnFx),
    Limiter {
        limit: f64,
    },
    MonoBelow {
        hz: f64,
    },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Gain { .. } => "gain",
            Stage::Highpass { .. } => "highpass",
            Stage::Eq(_) => "eq",
            Stage::Lowpass { .. } => "lowpass",
            Stage::Gate(_) => "gate",
            Stage::Expander(_) => "expander",
            Stage::Compressor(_) => "compressor",
            Stage::Duck { .. } => "duck",
            Stage::Saturation(_) => "saturation",
            Stage::Stereo { .. } => "stereo",
            Stage::Transient(_) => "transient",
            Stage::Send { .. } => "send",
            Stage::Return(_) => "return",
            Stage::Limiter { .. } => "limiter",
            Stage::MonoBelow { .. } => "mono_below",
        }
    }

    /// The linear filter text for single-input stages.
    ///
    /// Stages that need extra streams (ducks, sends, mono folding) are
    /// wired by the filtergraph writer and return `None`, as does the
    /// transient shaper, which the renderer applies after the graph.
    pub fn filter(&self) -> Option<String> {
        match self {
            Stage::Gain { db } => Some(format!("volume={}dB", db)),
            Stage::Highpass { hz } => Some(format!("highpass=f={}", hz)),
            Stage::Lowpass { hz } => Some(format!("lowpass=f={}", hz)),
            Stage::Eq(band) => {
                let name = match band.kind {
                    EqKind::Bell => "equalizer",
                    EqKind::LowShelf => "lowshelf",
                    EqKind::HighShelf => "highshelf",
                };
                Some(format!(
                    "{}=f={}:t=q:width_type=q:width={}:g={}",
                    name, band.f, band.q, band.g
                ))
            }
            Stage::Gate(d) => Some(format!("agate=threshold={}dB", d.threshold_db)),
            Stage::Expander(d) => Some(format!(
                "agate=threshold={}dB:ratio={}:attack={}:release={}",
                d.threshold_db, d.ratio, d.attack_ms, d.release_ms
            )),
            Stage::Compressor(d) => {
                let mut text = format!(
                    "acompressor=threshold={}dB:ratio={}:attack={}:release={}",
                    d.threshold_db, d.ratio, d.attack_ms, d.release_ms
                );
                if let Some(makeup_db) = d.makeup_db {
                    let linear = 10f64.powf(makeup_db / 20.0).clamp(1.0, 64.0);
                    text.push_str(&format!(":makeup={}", linear));
                }
                Some(text)
            }
            Stage::Saturation(sat) => {
                let curve = format!("asoftclip=type={}", sat.kind.as_str());
                if sat.drive != 1.0 {
                    Some(format!("volume={},{}", sat.drive, curve))
                } else {
                    Some(curve)
                }
            }
            Stage::Stereo { width } if *width != 1.0 => {
                Some(format!("stereotools=mlev=1.0:slev={}", width))
            }
            Stage::Return(ReturnFx::Reverb { decay, predelay_ms }) => {
                let early = (30.0 + predelay_ms).max(1.0);
                let late = (70.0 + predelay_ms).max(1.0);
                Some(format!(
                    "aecho=0.8:0.9:{}|{}:{}|{}",
                    early,
                    late,
                    decay,
                    (decay * 0.7).max(0.05)
                ))
            }
            Stage::Return(ReturnFx::Delay { ms, decay }) => {
                Some(format!("aecho=0.8:0.9:{}:{}", ms, decay))
            }
            Stage::Limiter { limit } => Some(format!("alimiter=limit={}", limit)),
            Stage::Stereo { .. }
            | Stage::Duck { .. }
            | Stage::Transient(_)
            | Stage::Send { .. }
            | Stage::MonoBelow { .. } => None,
        }
    }
}

/// Builds the shared part of a scope chain in its fixed order: gain,
/// high-pass, EQ bands as declared, low-pass, gate, expander, compressor,
/// `ducks`, saturation, stereo width, transient, then `sends`.
pub fn chain_stages(fx: &FxChain, ducks: Vec<Stage>, sends: Vec<Stage>) -> Vec<Stage> {
    let mut stages = Vec::new();
    if let Some(db) = fx.gain_db {
        stages.push(Stage::Gain { db });
    }
    if let Some(hz) = fx.highpass_hz {
        stages.push(Stage::Highpass { hz });
    }
    stages.extend(fx.eq.iter().cloned().map(Stage::Eq));
    if let Some(hz) = fx.lowpass_hz {
        stages.push(Stage::Lowpass { hz });
    }
    if let Some(gate) = &fx.gate {
        stages.push(Stage::Gate(gate.clone()));
    }
    if let Some(expander) = &fx.expander {
        stages.push(Stage::Expander(expander.clone()));
    }
    if let Some(comp) = &fx.comp {
        stages.push(Stage::Compressor(comp.clone()));
    }
    stages.extend(ducks);
    if let Some(sat) = &fx.sat {
        stages.push(Stage::Saturation(sat.clone()));
    }
    if let Some(stereo) = &fx.stereo {
        stages.push(Stage::Stereo {
            width: stereo.width,
        });
    }
    if let Some(transient) = &fx.transient {
        stages.push(Stage::Transient(transient.clone()));
    }
    stages.extend(sends);
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdaw_spec::{SatKind, Stereo};
    use pretty_assertions::assert_eq;

    fn names(stages: &[Stage]) -> Vec<&'static str> {
        stages.iter().map(Stage::name).collect()
    }

    #[test]
    fn order_is_fixed_regardless_of_document_order() {
        let fx: FxChain = serde_json::from_str(
            r#"{
                "transient": {"attack": 0.2},
                "stereo": {"width": 1.2},
                "sat": {"type": "tanh", "drive": 2.0},
                "comp": {"threshold_db": -18},
                "gate": {"threshold_db": -45},
                "lowpass_hz": 12000,
                "eq": [{"f": 300, "g": -3}, {"f": 3000, "g": 2}],
                "highpass_hz": 30,
                "gain_db": -2
            }"#,
        )
        .unwrap();
        let duck = Stage::Duck {
            source: 0,
            threshold_db: -24.0,
            ratio: 6.0,
            attack_ms: 5.0,
            release_ms: 120.0,
        };
        let send = Stage::Send {
            bus: "reverb".into(),
            level: 0.2,
        };
        let stages = chain_stages(&fx, vec![duck], vec![send]);
        assert_eq!(
            names(&stages),
            vec![
                "gain",
                "highpass",
                "eq",
                "eq",
                "lowpass",
                "gate",
                "compressor",
                "duck",
                "saturation",
                "stereo",
                "transient",
                "send"
            ]
        );
        match (&stages[2], &stages[3]) {
            (Stage::Eq(a), Stage::Eq(b)) => assert_eq!((a.f, b.f), (300.0, 3000.0)),
            other => panic!("unexpected stages {:?}", other),
        }
    }

    #[test]
    fn filter_text() {
        let comp = Dynamics::new(-18.0);
        assert_eq!(
            Stage::Compressor(comp).filter().unwrap(),
            "acompressor=threshold=-18dB:ratio=2:attack=5:release=50"
        );
        assert_eq!(Stage::Gain { db: -2.5 }.filter().unwrap(), "volume=-2.5dB");
        assert_eq!(
            Stage::Saturation(Saturation {
                kind: SatKind::Atan,
                drive: 1.5
            })
            .filter()
            .unwrap(),
            "volume=1.5,asoftclip=type=atan"
        );
        assert_eq!(
            Stage::Saturation(Saturation {
                kind: SatKind::Tanh,
                drive: 1.0
            })
            .filter()
            .unwrap(),
            "asoftclip=type=tanh"
        );
        assert_eq!(
            Stage::Return(ReturnFx::Reverb {
                decay: 0.5,
                predelay_ms: 10.0
            })
            .filter()
            .unwrap(),
            "aecho=0.8:0.9:40|80:0.5|0.35"
        );
        assert_eq!(
            Stage::Return(ReturnFx::delay()).filter().unwrap(),
            "aecho=0.8:0.9:240:0.25"
        );
    }

    #[test]
    fn unit_width_and_transient_have_no_filter() {
        let fx = FxChain {
            stereo: Some(Stereo { width: 1.0 }),
            ..FxChain::default()
        };
        let stages = chain_stages(&fx, Vec::new(), Vec::new());
        assert_eq!(stages[0].filter(), None);
        assert_eq!(
            Stage::Transient(Transient {
                attack: 0.5,
                sustain: 0.0
            })
            .filter(),
            None
        );
    }

    #[test]
    fn stages_serialize_tagged() {
        let json = serde_json::to_value(Stage::Send {
            bus: "delay".into(),
            level: 0.3,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"stage": "send", "bus": "delay", "level": 0.3}));
    }
}
