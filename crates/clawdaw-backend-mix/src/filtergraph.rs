//! Rendering a compiled plan as an ffmpeg `filter_complex` description.
//!
//! Input `i` of the renderer is the stem of track `i`. The final stream is
//! labelled `out` and always ends in a safety limiter.

use std::collections::{BTreeMap, VecDeque};

use crate::compile::MixPlan;
use crate::graph::Node;
use crate::stage::Stage;

const SAFETY_LIMIT: f64 = 0.98;

/// A stream being built: its current input labels plus linear filters not
/// yet written out.
struct Stream {
    base: String,
    next: usize,
    inputs: Vec<String>,
    chain: Vec<String>,
}

impl Stream {
    fn new(base: String, inputs: Vec<String>) -> Self {
        let chain = if inputs.len() > 1 {
            vec![amix(inputs.len())]
        } else {
            Vec::new()
        };
        Self {
            base,
            next: 0,
            inputs,
            chain,
        }
    }

    fn fresh(&mut self, suffix: &str) -> String {
        let label = match (self.next, suffix) {
            (0, "") => self.base.clone(),
            (n, "") => format!("{}_{}", self.base, n),
            (_, s) => format!("{}_{}", self.base, s),
        };
        if suffix.is_empty() {
            self.next += 1;
        }
        label
    }

    fn push(&mut self, filter: String) {
        self.chain.push(filter);
    }

    /// Writes pending filters and returns the single label carrying the
    /// stream.
    fn flush(&mut self, out: &mut Vec<String>) -> String {
        if self.chain.is_empty() && self.inputs.len() == 1 {
            return self.inputs[0].clone();
        }
        let label = self.fresh("");
        self.flush_as(out, label)
    }

    fn flush_as(&mut self, out: &mut Vec<String>, label: String) -> String {
        if self.chain.is_empty() {
            self.chain.push("anull".to_string());
        }
        out.push(format!(
            "{}{}[{}]",
            labels(&self.inputs),
            self.chain.join(","),
            label
        ));
        self.inputs = vec![label.clone()];
        self.chain.clear();
        label
    }

    /// Splits the stream; the first output continues it.
    fn split(&mut self, out: &mut Vec<String>, taps: &[String]) {
        let current = self.flush(out);
        let dry = self.fresh("dry");
        let mut outputs = vec![dry.clone()];
        outputs.extend(taps.iter().cloned());
        out.push(format!(
            "[{}]asplit={}{}",
            current,
            outputs.len(),
            labels(&outputs)
        ));
        self.inputs = vec![dry];
    }

    /// Folds everything below `hz` to mono.
    fn mono_below(&mut self, out: &mut Vec<String>, hz: f64) {
        let current = self.flush(out);
        let lo = self.fresh("lo");
        let hi = self.fresh("hi");
        let lo_mono = self.fresh("lomono");
        let hi_pass = self.fresh("hipass");
        out.push(format!("[{}]asplit=2[{}][{}]", current, lo, hi));
        out.push(format!(
            "[{}]lowpass=f={},pan=stereo|c0=0.5*c0+0.5*c1|c1=0.5*c0+0.5*c1[{}]",
            lo, hz, lo_mono
        ));
        out.push(format!("[{}]highpass=f={}[{}]", hi, hz, hi_pass));
        self.inputs = vec![lo_mono, hi_pass];
        self.chain = vec![amix(2)];
    }
}

fn amix(inputs: usize) -> String {
    format!("amix=inputs={}:normalize=0", inputs)
}

fn labels(names: &[String]) -> String {
    names.iter().map(|n| format!("[{}]", n)).collect()
}

fn bus_label(name: &str) -> String {
    format!("b_{}", name.replace('-', "_"))
}

impl MixPlan {
    /// Renders the plan as a deterministic `filter_complex` string.
    ///
    /// Scopes are written in schedule order, so every label is defined
    /// before it is consumed. A plan without tracks renders as an empty
    /// string.
    pub fn to_filtergraph(&self) -> String {
        if self.tracks.is_empty() {
            return String::new();
        }

        let mut out: Vec<String> = Vec::new();
        // Sidechain keys waiting to be consumed, per source track.
        let mut keys: BTreeMap<usize, VecDeque<String>> = BTreeMap::new();
        let mut key_demand: BTreeMap<usize, usize> = BTreeMap::new();
        for track in &self.tracks {
            for stage in &track.stages {
                if let Stage::Duck { source, .. } = stage {
                    *key_demand.entry(*source).or_default() += 1;
                }
            }
        }
        let mut bus_inputs: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut master_inputs: Vec<String> = Vec::new();

        for node in &self.schedule {
            match node {
                Node::Track(i) => {
                    let Some(track) = self.track(*i) else {
                        continue;
                    };
                    let input = format!("{}:a", i);
                    let mut stream = Stream::new(format!("t{}", i), vec![input.clone()]);
                    let mut sends = Vec::new();
                    for stage in &track.stages {
                        match stage {
                            Stage::Duck {
                                source,
                                threshold_db,
                                ratio,
                                attack_ms,
                                release_ms,
                            } => {
                                let main = stream.flush(&mut out);
                                let key = keys
                                    .get_mut(source)
                                    .and_then(VecDeque::pop_front)
                                    .unwrap_or_else(|| format!("t{}", source));
                                let ducked = stream.fresh("");
                                out.push(format!(
                                    "[{}][{}]sidechaincompress=threshold={}dB:ratio={}:attack={}:release={}[{}]",
                                    main, key, threshold_db, ratio, attack_ms, release_ms, ducked
                                ));
                                stream.inputs = vec![ducked];
                            }
                            Stage::Send { bus, level } => sends.push((bus.as_str(), *level)),
                            Stage::MonoBelow { hz } => stream.mono_below(&mut out, *hz),
                            other => {
                                if let Some(filter) = other.filter() {
                                    stream.push(filter);
                                }
                            }
                        }
                    }

                    let demand = key_demand.get(i).copied().unwrap_or(0);
                    let key_taps: Vec<String> =
                        (0..demand).map(|k| format!("t{}_key{}", i, k)).collect();
                    let send_taps: Vec<String> = sends
                        .iter()
                        .map(|(bus, _)| format!("t{}_send_{}", i, bus.replace('-', "_")))
                        .collect();
                    if key_taps.is_empty() && send_taps.is_empty() {
                        if stream.chain.is_empty() && stream.inputs == [input] {
                            stream.push("anull".to_string());
                        }
                    } else {
                        let taps: Vec<String> =
                            key_taps.iter().chain(send_taps.iter()).cloned().collect();
                        stream.split(&mut out, &taps);
                        keys.insert(*i, key_taps.into());
                        for ((bus, level), tap) in sends.iter().zip(&send_taps) {
                            let scaled = format!("{}_lvl", tap);
                            out.push(format!("[{}]volume={}[{}]", tap, level, scaled));
                            bus_inputs.entry(*bus).or_default().push(scaled);
                        }
                    }
                    let dry = stream.flush(&mut out);
                    bus_inputs.entry(track.bus.as_str()).or_default().push(dry);
                }
                Node::Bus(name) => {
                    let Some(bus) = self.bus(name) else {
                        continue;
                    };
                    let inputs = bus_inputs.remove(name.as_str()).unwrap_or_default();
                    if inputs.is_empty() {
                        continue;
                    }
                    let mut stream = Stream::new(bus_label(name), inputs);
                    write_linear(&mut stream, &mut out, &bus.stages);
                    let label = stream.flush(&mut out);
                    match &bus.output {
                        Some(next) => bus_inputs.entry(next.as_str()).or_default().push(label),
                        None => master_inputs.push(label),
                    }
                }
                Node::Master => {
                    if master_inputs.is_empty() {
                        continue;
                    }
                    let mut stream = Stream::new("mix".to_string(), std::mem::take(&mut master_inputs));
                    write_linear(&mut stream, &mut out, &self.master.stages);
                    stream.push(format!("alimiter=limit={}", SAFETY_LIMIT));
                    stream.flush_as(&mut out, "out".to_string());
                }
            }
        }

        out.join(";")
    }
}

fn write_linear(stream: &mut Stream, out: &mut Vec<String>, stages: &[Stage]) {
    for stage in stages {
        match stage {
            Stage::MonoBelow { hz } => stream.mono_below(out, *hz),
            other => {
                if let Some(filter) = other.filter() {
                    stream.push(filter);
                }
            }
        }
    }
}
