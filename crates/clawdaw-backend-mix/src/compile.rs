//! Mix spec compilation.
//!
//! Resolves every reference in the mix spec against the track list,
//! builds the dependency graph, schedules it and lays out the stage list
//! of each scope. All reference and range problems are collected before
//! anything is returned.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use clawdaw_spec::{
    pick_role_source, FxChain, MixSpec, Project, SidechainSource, SidechainSpec, Track,
};

use crate::error::MixError;
use crate::graph::{DependencyGraph, EdgeKind, Node};
use crate::stage::{chain_stages, Stage};

/// Compiled processing for one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPlan {
    pub index: usize,
    pub name: String,
    /// Bus the dry signal feeds.
    pub bus: String,
    pub stages: Vec<Stage>,
}

/// Compiled processing for one bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusPlan {
    pub name: String,
    /// Tracks whose dry output feeds this bus.
    pub members: Vec<usize>,
    /// Tracks sending into this bus.
    pub sends: Vec<usize>,
    /// Busses routed into this bus.
    pub routed: Vec<String>,
    /// Downstream bus; master when `None`.
    pub output: Option<String>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterPlan {
    /// Busses routed into master.
    pub inputs: Vec<String>,
    pub stages: Vec<Stage>,
}

/// The compiled mix: a valid schedule plus per-scope stage lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixPlan {
    /// Every node in an order where each scope follows all its inputs.
    pub schedule: Vec<Node>,
    pub tracks: Vec<TrackPlan>,
    pub busses: BTreeMap<String, BusPlan>,
    pub master: MasterPlan,
}

impl MixPlan {
    pub fn track(&self, index: usize) -> Option<&TrackPlan> {
        self.tracks.get(index)
    }

    pub fn bus(&self, name: &str) -> Option<&BusPlan> {
        self.busses.get(name)
    }

    pub fn stage_count(&self) -> usize {
        self.tracks.iter().map(|t| t.stages.len()).sum::<usize>()
            + self.busses.values().map(|b| b.stages.len()).sum::<usize>()
            + self.master.stages.len()
    }
}

/// Compiles the mix of a project.
pub fn compile_project_mix(project: &Project) -> Result<MixPlan, Vec<MixError>> {
    compile_mix(&project.mix, &project.tracks)
}

/// Compiles `spec` against `tracks`.
pub fn compile_mix(spec: &MixSpec, tracks: &[Track]) -> Result<MixPlan, Vec<MixError>> {
    let mut errors = Vec::new();
    let count = tracks.len();

    for key in spec.tracks.keys() {
        match key.parse::<usize>() {
            Ok(i) if i < count => {}
            Ok(i) => errors.push(MixError::MissingTrack {
                context: format!("mix entry '{}'", key),
                track: i,
                count,
            }),
            Err(_) => errors.push(MixError::InvalidTrackKey { key: key.clone() }),
        }
    }

    let track_bus: Vec<String> = tracks.iter().map(Track::effective_bus).collect();
    let known_busses: BTreeSet<&str> = spec
        .busses
        .keys()
        .map(String::as_str)
        .chain(track_bus.iter().map(String::as_str))
        .collect();

    let mut graph = DependencyGraph::new();
    graph.add_node(Node::Master);

    let mut bus_output: BTreeMap<&str, Option<String>> = BTreeMap::new();
    for &bus in &known_busses {
        let declared = spec.busses.get(bus);
        if let Some(fx) = declared {
            check_fx(&format!("bus '{}'", bus), &fx.fx, &mut errors);
            check_positive(&format!("bus '{}'", bus), "mono_below_hz", fx.mono_below_hz, &mut errors);
        }
        match declared.and_then(|b| b.output.as_deref()) {
            Some(out) if known_busses.contains(out) => {
                graph.add_edge(bus_node(bus), bus_node(out), EdgeKind::Route);
                bus_output.insert(bus, Some(out.to_string()));
            }
            Some(out) => {
                errors.push(MixError::UnknownOutputBus {
                    bus: bus.to_string(),
                    output: out.to_string(),
                });
                bus_output.insert(bus, None);
            }
            None => {
                graph.add_edge(bus_node(bus), Node::Master, EdgeKind::Route);
                bus_output.insert(bus, None);
            }
        }
    }

    let mut sends: Vec<Vec<Stage>> = vec![Vec::new(); count];
    for (i, bus) in track_bus.iter().enumerate() {
        graph.add_edge(Node::Track(i), bus_node(bus), EdgeKind::Member);
        let Some(entry) = spec.track(i) else {
            continue;
        };
        let scope = format!("track {}", i);
        check_fx(&scope, &entry.fx, &mut errors);
        for (target, &level) in &entry.sends {
            if !spec.busses.contains_key(target) {
                errors.push(MixError::UnknownSendBus {
                    track: i,
                    bus: target.clone(),
                });
                continue;
            }
            if !(0.0..=1.0).contains(&level) {
                errors.push(MixError::out_of_range(&scope, "send level", level, "0..=1"));
                continue;
            }
            graph.add_edge(Node::Track(i), bus_node(target), EdgeKind::Send);
            sends[i].push(Stage::Send {
                bus: target.clone(),
                level,
            });
        }
    }

    let mut ducks: Vec<Vec<Stage>> = vec![Vec::new(); count];
    for sc in &spec.sidechain {
        let src = resolve_source(&sc.src, tracks, &mut errors);
        if sc.dst >= count {
            errors.push(MixError::MissingTrack {
                context: "sidechain destination".to_string(),
                track: sc.dst,
                count,
            });
            continue;
        }
        let Some(src) = src else {
            continue;
        };
        if src == sc.dst {
            errors.push(MixError::SelfSidechain { track: src });
            continue;
        }
        graph.add_edge(Node::Track(src), Node::Track(sc.dst), EdgeKind::Sidechain);
        ducks[sc.dst].push(duck_stage(src, sc));
    }

    check_fx("master", &spec.master.fx, &mut errors);
    check_positive("master", "mono_below_hz", spec.master.mono_below_hz, &mut errors);
    if let Some(limiter) = &spec.master.limiter {
        if !(limiter.limit > 0.0 && limiter.limit <= 1.0) {
            errors.push(MixError::out_of_range("master", "limit", limiter.limit, "(0, 1]"));
        }
    }

    let schedule = match graph.topological_order() {
        Ok(order) => order,
        Err(cycle) => {
            errors.push(cycle);
            Vec::new()
        }
    };

    if !errors.is_empty() {
        debug!(errors = errors.len(), "mix compile failed");
        return Err(errors);
    }

    let empty = FxChain::default();
    let track_plans: Vec<TrackPlan> = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let fx = spec.track(i).map_or(&empty, |t| &t.fx);
            TrackPlan {
                index: i,
                name: track.name.clone(),
                bus: track_bus[i].clone(),
                stages: chain_stages(
                    fx,
                    std::mem::take(&mut ducks[i]),
                    std::mem::take(&mut sends[i]),
                ),
            }
        })
        .collect();

    let mut busses: BTreeMap<String, BusPlan> = BTreeMap::new();
    for (&name, output) in &bus_output {
        let declared = spec.busses.get(name);
        let mut stages = chain_stages(declared.map_or(&empty, |b| &b.fx), Vec::new(), Vec::new());
        if let Some(fx) = declared.and_then(|b| b.return_fx.clone()) {
            stages.push(Stage::Return(fx));
        }
        if let Some(hz) = declared.and_then(|b| b.mono_below_hz) {
            stages.push(Stage::MonoBelow { hz });
        }
        let sends_in = track_plans
            .iter()
            .filter(|t| {
                t.stages
                    .iter()
                    .any(|s| matches!(s, Stage::Send { bus, .. } if bus == name))
            })
            .map(|t| t.index)
            .collect();
        busses.insert(
            name.to_string(),
            BusPlan {
                name: name.to_string(),
                members: (0..count).filter(|&i| track_bus[i] == name).collect(),
                sends: sends_in,
                routed: bus_output
                    .iter()
                    .filter(|(_, out)| out.as_deref() == Some(name))
                    .map(|(b, _)| b.to_string())
                    .collect(),
                output: output.clone(),
                stages,
            },
        );
    }

    let mut master_stages = chain_stages(&spec.master.fx, Vec::new(), Vec::new());
    if let Some(limiter) = &spec.master.limiter {
        master_stages.push(Stage::Limiter {
            limit: limiter.limit,
        });
    }
    if let Some(hz) = spec.master.mono_below_hz {
        master_stages.push(Stage::MonoBelow { hz });
    }

    let plan = MixPlan {
        schedule,
        tracks: track_plans,
        master: MasterPlan {
            inputs: busses
                .values()
                .filter(|b| b.output.is_none())
                .map(|b| b.name.clone())
                .collect(),
            stages: master_stages,
        },
        busses,
    };
    debug!(
        nodes = plan.schedule.len(),
        stages = plan.stage_count(),
        edges = graph.edges().len(),
        "compiled mix"
    );
    Ok(plan)
}

fn bus_node(name: &str) -> Node {
    Node::Bus(name.to_string())
}

fn duck_stage(source: usize, sc: &SidechainSpec) -> Stage {
    Stage::Duck {
        source,
        threshold_db: sc.threshold_db,
        ratio: sc.ratio,
        attack_ms: sc.attack_ms,
        release_ms: sc.release_ms,
    }
}

/// Resolves a sidechain key source to a track index. A role that spells a
/// number is read as an index.
fn resolve_source(
    src: &SidechainSource,
    tracks: &[Track],
    errors: &mut Vec<MixError>,
) -> Option<usize> {
    let Some(index) = src.track_index() else {
        let role = src.role_name().unwrap_or_default();
        return match pick_role_source(tracks.iter().map(|t| t.name.as_str()), role) {
            Some(i) => Some(i),
            None => {
                errors.push(MixError::UnresolvedRole {
                    role: role.to_string(),
                });
                None
            }
        };
    };
    if index >= tracks.len() {
        errors.push(MixError::MissingTrack {
            context: "sidechain source".to_string(),
            track: index,
            count: tracks.len(),
        });
        return None;
    }
    Some(index)
}

fn check_positive(scope: &str, param: &'static str, value: Option<f64>, errors: &mut Vec<MixError>) {
    if let Some(v) = value {
        if !(v > 0.0 && v.is_finite()) {
            errors.push(MixError::out_of_range(scope, param, v, "> 0 Hz"));
        }
    }
}

fn check_fx(scope: &str, fx: &FxChain, errors: &mut Vec<MixError>) {
    check_positive(scope, "highpass_hz", fx.highpass_hz, errors);
    check_positive(scope, "lowpass_hz", fx.lowpass_hz, errors);
    for band in &fx.eq {
        check_positive(scope, "eq.f", Some(band.f), errors);
        if !(band.q > 0.0) {
            errors.push(MixError::out_of_range(scope, "eq.q", band.q, "> 0"));
        }
    }
    if let Some(stereo) = &fx.stereo {
        if !(0.0..=2.0).contains(&stereo.width) {
            errors.push(MixError::out_of_range(scope, "stereo.width", stereo.width, "0..=2"));
        }
    }
    if let Some(t) = &fx.transient {
        for (param, value) in [("transient.attack", t.attack), ("transient.sustain", t.sustain)] {
            if !(-1.0..=1.0).contains(&value) {
                errors.push(MixError::out_of_range(scope, param, value, "-1..=1"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdaw_spec::{BackendError, BusMix, ReturnFx, TrackMode};
    use pretty_assertions::assert_eq;

    fn tracks(names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Track::new(*n, i as u8, TrackMode::default()))
            .collect()
    }

    fn mix(json: serde_json::Value) -> MixSpec {
        serde_json::from_value(json).unwrap()
    }

    fn position(plan: &MixPlan, node: &Node) -> usize {
        plan.schedule.iter().position(|n| n == node).unwrap()
    }

    #[test]
    fn schedule_orders_sources_busses_and_master() {
        let spec = mix(serde_json::json!({
            "tracks": {"2": {"sends": {"verb": 0.2}}},
            "sidechain": [{"src": "kick", "dst": 1}],
            "busses": {"verb": {"return": {"type": "reverb"}}}
        }));
        let tracks = tracks(&["Kick", "Bass", "Pad"]);
        let plan = compile_mix(&spec, &tracks).unwrap();

        assert!(position(&plan, &Node::Track(0)) < position(&plan, &Node::Track(1)));
        for t in &plan.tracks {
            assert!(position(&plan, &Node::Track(t.index)) < position(&plan, &bus_node(&t.bus)));
        }
        assert!(position(&plan, &Node::Track(2)) < position(&plan, &bus_node("verb")));
        assert_eq!(plan.schedule.last(), Some(&Node::Master));

        assert_eq!(plan.tracks[0].bus, "drums");
        assert_eq!(plan.tracks[1].bus, "bass");
        assert_eq!(plan.tracks[2].bus, "music");
        assert_eq!(plan.bus("verb").unwrap().sends, vec![2]);
        assert_eq!(
            plan.master.inputs,
            vec!["bass".to_string(), "drums".into(), "music".into(), "verb".into()]
        );
    }

    #[test]
    fn mutual_sidechain_fails_naming_the_edge() {
        let spec = mix(serde_json::json!({
            "sidechain": [{"src": 0, "dst": 1}, {"src": 1, "dst": 0}]
        }));
        let errors = compile_mix(&spec, &tracks(&["a", "b"])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "MIX_008");
        assert!(matches!(errors[0], MixError::Cycle { .. }));
        assert!(errors[0].to_string().contains("track:"));
    }

    #[test]
    fn bus_routing_cycle_fails() {
        let spec = mix(serde_json::json!({
            "busses": {
                "a": {"output": "b"},
                "b": {"output": "a"}
            }
        }));
        let tracks = {
            let mut t = tracks(&["x"]);
            t[0].bus = Some("a".into());
            t
        };
        let errors = compile_mix(&spec, &tracks).unwrap_err();
        assert_eq!(
            errors,
            vec![MixError::Cycle {
                from: bus_node("b"),
                to: bus_node("a")
            }]
        );
    }

    #[test]
    fn reference_errors_are_collected_per_edge() {
        let spec = mix(serde_json::json!({
            "tracks": {
                "0": {"sends": {"plate": 0.3}},
                "5": {"gain_db": 1.0},
                "lead": {}
            },
            "sidechain": [
                {"src": "snare", "dst": 0},
                {"src": 1, "dst": 1},
                {"src": 0, "dst": 9}
            ],
            "busses": {"verb": {"output": "nowhere"}}
        }));
        let errors = compile_mix(&spec, &tracks(&["pad", "keys"])).unwrap_err();
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(
            codes,
            vec!["MIX_002", "MIX_001", "MIX_004", "MIX_003", "MIX_005", "MIX_006", "MIX_002"]
        );
    }

    #[test]
    fn ducks_follow_compressor_and_precede_saturation() {
        let spec = mix(serde_json::json!({
            "tracks": {"1": {"comp": {"threshold_db": -20}, "sat": {"type": "tanh"}}},
            "sidechain": [{"src": 0, "dst": 1, "ratio": 8}]
        }));
        let plan = compile_mix(&spec, &tracks(&["kick", "bass"])).unwrap();
        let names: Vec<&str> = plan.tracks[1].stages.iter().map(Stage::name).collect();
        assert_eq!(names, vec!["compressor", "duck", "saturation"]);
        match &plan.tracks[1].stages[1] {
            Stage::Duck { source, ratio, .. } => assert_eq!((*source, *ratio), (0, 8.0)),
            other => panic!("expected duck, got {:?}", other),
        }
    }

    #[test]
    fn bus_and_master_tail_stages() {
        let mut spec = MixSpec::default();
        spec.busses.insert(
            "drums".into(),
            BusMix {
                return_fx: Some(ReturnFx::delay()),
                mono_below_hz: Some(150.0),
                ..BusMix::default()
            },
        );
        spec.master.fx.gain_db = Some(-1.0);
        spec.master.limiter = Some(clawdaw_spec::Limiter { limit: 0.95 });
        spec.master.mono_below_hz = Some(100.0);

        let plan = compile_mix(&spec, &tracks(&["drums"])).unwrap();
        let bus: Vec<&str> = plan.bus("drums").unwrap().stages.iter().map(Stage::name).collect();
        assert_eq!(bus, vec!["return", "mono_below"]);
        let master: Vec<&str> = plan.master.stages.iter().map(Stage::name).collect();
        assert_eq!(master, vec!["gain", "limiter", "mono_below"]);
    }

    #[test]
    fn range_checks() {
        let spec = mix(serde_json::json!({
            "tracks": {"0": {"sends": {"verb": 1.5}, "transient": {"attack": 2.0}}},
            "busses": {"verb": {}},
            "master": {"limiter": {"limit": 0.0}}
        }));
        let errors = compile_mix(&spec, &tracks(&["pad"])).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.code() == "MIX_007"));
    }

    #[test]
    fn empty_project_compiles_to_master_only() {
        let plan = compile_mix(&MixSpec::default(), &[]).unwrap();
        assert_eq!(plan.schedule, vec![Node::Master]);
        assert!(plan.master.inputs.is_empty());
    }

    #[test]
    fn compile_is_deterministic() {
        let spec = mix(serde_json::json!({
            "tracks": {"0": {"eq": [{"f": 200, "g": -2}]}, "1": {"sends": {"verb": 0.1}}},
            "sidechain": [{"src": "kick", "dst": 1}],
            "busses": {"verb": {"return": {"type": "reverb"}}}
        }));
        let tracks = tracks(&["kick", "bass"]);
        let a = serde_json::to_string(&compile_mix(&spec, &tracks).unwrap()).unwrap();
        let b = serde_json::to_string(&compile_mix(&spec, &tracks).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
