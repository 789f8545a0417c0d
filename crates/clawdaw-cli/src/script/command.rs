//! The command language as a closed set of typed commands.
//!
//! Parsing turns a tokenized line into a [`Command`] with every argument
//! converted and every default filled in. Time arguments are checked for
//! shape here and resolved against the project's time base when executed.

use std::path::PathBuf;

use clawdaw_spec::gm::parse_program;
use clawdaw_spec::{
    CoreError, Dynamics, MixerParam, NoteKey, SamplerKind, SatKind, SidechainSource,
    SidechainSpec, Tick, TimeBase,
};

use super::token::{parse_bool, Args, Tokens};

/// A time argument as written: ticks or `bar:beat[:tick]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeArg(String);

impl TimeArg {
    fn parse(text: &str, signed: bool) -> Result<Self, CoreError> {
        let body = match text.strip_prefix('-') {
            Some(rest) if signed => rest,
            _ => text,
        };
        let parts: Vec<&str> = body.split(':').collect();
        let well_formed = parts.len() <= 3
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(CoreError::syntax(format!(
                "invalid time '{}': expected ticks or bar:beat[:tick]",
                text
            )));
        }
        Ok(TimeArg(text.to_string()))
    }

    pub fn ticks(&self, tb: TimeBase) -> Result<Tick, CoreError> {
        Ok(tb.parse(&self.0)?)
    }

    /// Resolves a relative offset, which may be negative.
    pub fn delta(&self, tb: TimeBase) -> Result<Tick, CoreError> {
        Ok(tb.parse_delta(&self.0)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Scope a mix command edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixTarget {
    Track(usize),
    Bus(String),
    Master,
}

impl std::fmt::Display for MixTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixTarget::Track(i) => write!(f, "track {}", i),
            MixTarget::Bus(b) => write!(f, "bus '{}'", b),
            MixTarget::Master => f.write_str("master"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqShape {
    Bell,
    LowShelf,
    HighShelf,
    Highpass,
    Lowpass,
}

impl EqShape {
    fn parse(text: &str) -> Option<EqShape> {
        match text.trim().to_lowercase().as_str() {
            "bell" | "peaking" => Some(EqShape::Bell),
            "lowshelf" | "low_shelf" | "ls" => Some(EqShape::LowShelf),
            "highshelf" | "high_shelf" | "hs" => Some(EqShape::HighShelf),
            "hp" | "highpass" => Some(EqShape::Highpass),
            "lp" | "lowpass" => Some(EqShape::Lowpass),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EqOpts {
    pub shape: EqShape,
    pub f: f64,
    pub q: f64,
    pub g: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Gate,
    Expander,
}

/// Expression fields of `add_note_pat`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteOpts {
    pub velocity: u8,
    pub chance: f64,
    pub mute: bool,
    pub accent: f64,
    pub glide: Option<TimeArg>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HumanizeOpts {
    pub timing: Option<Tick>,
    pub velocity: Option<u8>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Wav,
    Mp3,
    M4a,
    PreviewMp3,
    Stems,
    Busses,
    Midi,
}

/// Options shared by the audio exports.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOpts {
    pub sample_rate: u32,
    pub preset: String,
    pub fade: Option<f64>,
    pub trim: Option<f64>,
    pub bitrate: Option<String>,
    /// Mix spec file used instead of the project's for this render.
    pub mix: Option<PathBuf>,
    /// Preview window start.
    pub start: Option<TimeArg>,
    /// Preview window length in bars.
    pub bars: u32,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            preset: "demo".to_string(),
            fade: None,
            trim: None,
            bitrate: None,
            mix: None,
            start: None,
            bars: 8,
        }
    }
}

/// One command of the script language.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Include { path: PathBuf },

    // Project
    NewProject { name: String, bpm: f64 },
    OpenProject { path: PathBuf },
    SaveProject { path: Option<PathBuf> },
    ValidateProject,
    DumpState { path: PathBuf },
    AnalyzeRefs { path: PathBuf },

    // Tracks
    AddTrack { name: String, program: u8 },
    DeleteTrack { track: Option<usize> },
    SetProgram { track: usize, program: u8 },
    SetMixer { track: usize, param: MixerParam, value: i64 },
    SetBus { track: usize, bus: String },
    SetSampler { track: usize, kind: Option<SamplerKind> },
    SetSamplerPreset { track: usize, preset: String },
    SetKit { track: usize, preset: String },
    Set808 { track: usize, preset: String },
    SetDrumKit { track: usize, kit: String },
    ListDrumKits,
    SetInstrument { track: usize, id: String, preset: Option<String>, seed: u64 },
    SetGlide { track: usize, glide: TimeArg },
    SetHumanize { track: usize, opts: HumanizeOpts },
    Mute { track: usize, on: bool },
    Solo { track: usize, on: bool },

    // Transport
    SetBpm { bpm: f64 },
    SetSwing { percent: i64 },
    SetLoop { start: TimeArg, end: TimeArg },
    ClearLoop,
    SetRenderRegion { start: TimeArg, end: TimeArg },
    ClearRenderRegion,

    // Patterns and clips
    NewPattern { track: usize, name: String, length: TimeArg },
    RenamePattern { track: usize, old: String, new: String },
    DeletePattern { track: usize, name: String },
    DuplicatePattern { track: usize, src: String, dst: String },
    PatternTranspose { track: usize, name: String, semitones: i32 },
    PatternShift { track: usize, name: String, delta: TimeArg },
    PatternStretch { track: usize, name: String, factor: f64 },
    PatternReverse { track: usize, name: String },
    PatternVelocity { track: usize, name: String, scale: f64 },
    AddNote {
        track: usize,
        pattern: String,
        key: NoteKey,
        start: TimeArg,
        duration: TimeArg,
        opts: NoteOpts,
    },
    PlacePattern { track: usize, pattern: String, start: TimeArg, repeats: u32 },
    MoveClip { track: usize, clip: usize, start: TimeArg },
    DeleteClip { track: usize, clip: usize },
    CopyBars { track: Option<usize>, src_bar: u32, bars: u32, dst_bar: u32 },
    ClearClips { track: Option<usize> },
    AddSection { name: String, start_bar: u32, length_bars: u32 },

    // Arrangement and mix
    ApplyArrangement { path: PathBuf },
    LoadMix { path: PathBuf },
    Eq { target: MixTarget, opts: EqOpts },
    Dynamics { target: MixTarget, mode: DynamicsMode, params: Dynamics },
    Saturate { target: MixTarget, kind: SatKind, drive: f64 },
    StereoWidth { target: MixTarget, width: f64 },
    Send { track: usize, bus: String, level: f64 },
    Sidechain(SidechainSpec),
    Transient { target: MixTarget, attack: f64, sustain: f64 },
    Limiter { limit: Option<f64> },
    MonoBelow { target: MixTarget, hz: Option<f64> },
    CompileMix { path: Option<PathBuf> },

    // Render and export
    Export { kind: ExportKind, path: Option<PathBuf>, opts: ExportOpts },
}

/// Which dynamics slot a dynamics command fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicsMode {
    Compressor,
    Gate(GateMode),
}

fn finite(value: f64, what: &str) -> Result<f64, CoreError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoreError::syntax(format!("{} must be a finite number", what)))
    }
}

fn time(args: &mut Args, what: &str) -> Result<TimeArg, CoreError> {
    TimeArg::parse(&args.required(what)?, false)
}

fn program(args: &Args, text: &str) -> Result<u8, CoreError> {
    parse_program(text).ok_or_else(|| {
        CoreError::range(format!(
            "{}: '{}' is not a GM program (0-127 or a name)",
            args.command(),
            text
        ))
    })
}

/// Reads `track=<i>`, `bus=<name>`, `target=master` or a bare `master`.
fn target(args: &mut Args, default: Option<MixTarget>) -> Result<MixTarget, CoreError> {
    if let Some(track) = args.kw_as::<usize>("track")? {
        return Ok(MixTarget::Track(track));
    }
    if let Some(bus) = args.kw("bus") {
        return Ok(MixTarget::Bus(bus.trim().to_lowercase()));
    }
    let named_master = match args.kw("target") {
        Some(t) if t.eq_ignore_ascii_case("master") => true,
        Some(t) => {
            return Err(CoreError::syntax(format!(
                "{}: unknown target '{}'",
                args.command(),
                t
            )))
        }
        None => false,
    };
    if named_master || args.flag("master") {
        return Ok(MixTarget::Master);
    }
    default.ok_or_else(|| {
        CoreError::syntax(format!(
            "{} needs track=<index>, bus=<name> or master",
            args.command()
        ))
    })
}

fn dynamics(args: &mut Args, threshold: f64) -> Result<Dynamics, CoreError> {
    let mut d = Dynamics::new(threshold);
    d.threshold_db = finite(args.kw_or("threshold_db", d.threshold_db)?, "threshold_db")?;
    d.ratio = finite(args.kw_or("ratio", d.ratio)?, "ratio")?;
    d.attack_ms = finite(args.kw_or("attack_ms", d.attack_ms)?, "attack_ms")?;
    d.release_ms = finite(args.kw_or("release_ms", d.release_ms)?, "release_ms")?;
    d.makeup_db = args.kw_as::<f64>("makeup_db")?;
    Ok(d)
}

fn optional_track(args: &mut Args) -> Result<Option<usize>, CoreError> {
    match args.optional() {
        None => Ok(None),
        Some(t) if t.eq_ignore_ascii_case("all") => Ok(None),
        Some(t) => t.parse::<usize>().map(Some).map_err(|_| {
            CoreError::syntax(format!("{}: invalid track '{}'", args.command(), t))
        }),
    }
}

fn export_opts(args: &mut Args, kind: ExportKind) -> Result<ExportOpts, CoreError> {
    let mut opts = ExportOpts::default();
    if matches!(kind, ExportKind::Stems | ExportKind::Busses | ExportKind::Midi) {
        return Ok(opts);
    }
    opts.sample_rate = args.kw_or("sr", opts.sample_rate)?;
    if let Some(preset) = args.kw("preset") {
        opts.preset = preset;
    }
    opts.bitrate = args.kw("br");
    if kind == ExportKind::PreviewMp3 {
        opts.bars = args.kw_or("bars", opts.bars)?;
        if opts.bars == 0 {
            return Err(CoreError::range("preview needs at least one bar"));
        }
        opts.start = args
            .kw("start")
            .map(|s| TimeArg::parse(&s, false))
            .transpose()?;
    } else {
        opts.fade = args.kw_as::<f64>("fade")?.map(|f| finite(f, "fade")).transpose()?;
        opts.trim = args.kw_as::<f64>("trim")?.map(|t| finite(t, "trim")).transpose()?;
        opts.mix = args.kw("mix").map(PathBuf::from);
    }
    Ok(opts)
}

impl Command {
    /// Parses one script line. Blank and comment lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CoreError> {
        match Tokens::parse(line)? {
            Some(tokens) => Command::from_tokens(tokens).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_tokens(tokens: Tokens) -> Result<Command, CoreError> {
        let mut args = Args::new(tokens);
        let name = args.command().to_string();
        let cmd = match name.as_str() {
            "include" => Command::Include {
                path: PathBuf::from(args.required("path")?),
            },

            "new_project" => Command::NewProject {
                name: args.required("name")?,
                bpm: finite(args.optional_as("bpm")?.unwrap_or(120.0), "bpm")?,
            },
            "open_project" => Command::OpenProject {
                path: PathBuf::from(args.required("path")?),
            },
            "save_project" | "export_project" => Command::SaveProject {
                path: args.optional().map(PathBuf::from),
            },
            "validate_project" => Command::ValidateProject,
            "dump_state" => Command::DumpState {
                path: PathBuf::from(args.required("path")?),
            },
            "analyze_refs" => Command::AnalyzeRefs {
                path: PathBuf::from(args.required("path")?),
            },

            "add_track" => {
                let track_name = args.required("name")?;
                let program = match args.optional() {
                    Some(p) => program(&args, &p)?,
                    None => 0,
                };
                Command::AddTrack {
                    name: track_name,
                    program,
                }
            }
            "delete_track" => Command::DeleteTrack {
                track: args.optional_as("track")?,
            },
            "set_program" => {
                let track = args.required_as("track")?;
                let p = args.required("program")?;
                Command::SetProgram {
                    track,
                    program: program(&args, &p)?,
                }
            }
            "set_volume" | "set_pan" | "set_reverb" | "set_chorus" => {
                let param = match name.as_str() {
                    "set_volume" => MixerParam::Volume,
                    "set_pan" => MixerParam::Pan,
                    "set_reverb" => MixerParam::Reverb,
                    _ => MixerParam::Chorus,
                };
                Command::SetMixer {
                    track: args.required_as("track")?,
                    param,
                    value: args.required_as("value")?,
                }
            }
            "set_bus" => Command::SetBus {
                track: args.required_as("track")?,
                bus: args.required("bus")?,
            },
            "set_sampler" => {
                let track = args.required_as("track")?;
                let mode = args.optional().unwrap_or_else(|| "none".into());
                let kind = match mode.trim().to_lowercase().as_str() {
                    "none" | "off" | "0" => None,
                    other => Some(SamplerKind::parse(other).ok_or_else(|| {
                        CoreError::range("sampler mode must be: drums, 808, none")
                    })?),
                };
                Command::SetSampler { track, kind }
            }
            "set_sampler_preset" => Command::SetSamplerPreset {
                track: args.required_as("track")?,
                preset: args.required("preset")?,
            },
            "set_kit" => Command::SetKit {
                track: args.required_as("track")?,
                preset: args.required("preset")?,
            },
            "set_808" => Command::Set808 {
                track: args.required_as("track")?,
                preset: args.required("preset")?,
            },
            "set_drum_kit" => Command::SetDrumKit {
                track: args.required_as("track")?,
                kit: args.required("kit")?,
            },
            "list_drum_kits" => Command::ListDrumKits,
            "set_instrument" => Command::SetInstrument {
                track: args.required_as("track")?,
                id: args.required("id")?,
                preset: args.kw("preset"),
                seed: args.kw_or("seed", 0)?,
            },
            "set_glide" => Command::SetGlide {
                track: args.required_as("track")?,
                glide: time(&mut args, "time")?,
            },
            "set_humanize" => Command::SetHumanize {
                track: args.required_as("track")?,
                opts: HumanizeOpts {
                    timing: args.kw_as("timing")?,
                    velocity: args.kw_as("velocity")?,
                    seed: args.kw_as("seed")?,
                },
            },
            "mute" | "solo" => {
                let track = args.required_as("track")?;
                let on = match args.optional() {
                    Some(v) => parse_bool(&v).ok_or_else(|| {
                        CoreError::syntax(format!("{}: expected 0 or 1, got '{}'", name, v))
                    })?,
                    None => true,
                };
                if name == "mute" {
                    Command::Mute { track, on }
                } else {
                    Command::Solo { track, on }
                }
            }

            "set_bpm" => Command::SetBpm {
                bpm: finite(args.required_as("bpm")?, "bpm")?,
            },
            "set_swing" => Command::SetSwing {
                percent: args.required_as("percent")?,
            },
            "set_loop" => Command::SetLoop {
                start: time(&mut args, "start")?,
                end: time(&mut args, "end")?,
            },
            "clear_loop" => Command::ClearLoop,
            "set_render_region" => Command::SetRenderRegion {
                start: time(&mut args, "start")?,
                end: time(&mut args, "end")?,
            },
            "clear_render_region" => Command::ClearRenderRegion,

            "new_pattern" => Command::NewPattern {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
                length: time(&mut args, "length")?,
            },
            "rename_pattern" => Command::RenamePattern {
                track: args.required_as("track")?,
                old: args.required("old")?,
                new: args.required("new")?,
            },
            "delete_pattern" => Command::DeletePattern {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
            },
            "duplicate_pattern" => Command::DuplicatePattern {
                track: args.required_as("track")?,
                src: args.required("src")?,
                dst: args.required("dst")?,
            },
            "pattern_transpose" => Command::PatternTranspose {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
                semitones: args.required_as("semitones")?,
            },
            "pattern_shift" => Command::PatternShift {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
                delta: TimeArg::parse(&args.required("ticks")?, true)?,
            },
            "pattern_stretch" => Command::PatternStretch {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
                factor: finite(args.required_as("factor")?, "factor")?,
            },
            "pattern_reverse" => Command::PatternReverse {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
            },
            "pattern_vel" => Command::PatternVelocity {
                track: args.required_as("track")?,
                name: args.required("pattern")?,
                scale: finite(args.required_as("scale")?, "scale")?,
            },
            "add_note_pat" => {
                let track = args.required_as("track")?;
                let pattern = args.required("pattern")?;
                let key = NoteKey::parse(&args.required("pitch")?)?;
                let start = time(&mut args, "start")?;
                let duration = time(&mut args, "duration")?;
                let velocity = match args.optional_as::<u8>("velocity")? {
                    Some(v) => v,
                    None => args.kw_or("velocity", 100)?,
                };
                let mute = match args.kw("mute") {
                    Some(v) => parse_bool(&v)
                        .ok_or_else(|| CoreError::syntax(format!("mute: expected 0 or 1, got '{}'", v)))?,
                    None => false,
                };
                let opts = NoteOpts {
                    velocity,
                    chance: finite(args.kw_or("chance", 1.0)?, "chance")?,
                    mute,
                    accent: finite(args.kw_or("accent", 1.0)?, "accent")?,
                    glide: args
                        .kw("glide_ticks")
                        .map(|g| TimeArg::parse(&g, false))
                        .transpose()?,
                };
                Command::AddNote {
                    track,
                    pattern,
                    key,
                    start,
                    duration,
                    opts,
                }
            }
            "place_pattern" => Command::PlacePattern {
                track: args.required_as("track")?,
                pattern: args.required("pattern")?,
                start: time(&mut args, "start")?,
                repeats: args.optional_as("repeats")?.unwrap_or(1),
            },
            "move_clip" => Command::MoveClip {
                track: args.required_as("track")?,
                clip: args.required_as("clip")?,
                start: time(&mut args, "start")?,
            },
            "delete_clip" => Command::DeleteClip {
                track: args.required_as("track")?,
                clip: args.required_as("clip")?,
            },
            "copy_bars" => {
                // copy_bars [track|all] <src_bar> <bars> <dst_bar>
                let track = if args.remaining_positional() >= 4 {
                    optional_track(&mut args)?
                } else {
                    None
                };
                Command::CopyBars {
                    track,
                    src_bar: args.required_as("src_bar")?,
                    bars: args.required_as("bars")?,
                    dst_bar: args.required_as("dst_bar")?,
                }
            }
            "clear_clips" => Command::ClearClips {
                track: optional_track(&mut args)?,
            },
            "add_section" => Command::AddSection {
                name: args.required("name")?,
                start_bar: args.required_as("start_bar")?,
                length_bars: args.required_as("length_bars")?,
            },

            "apply_arrangement" => Command::ApplyArrangement {
                path: PathBuf::from(args.required("path")?),
            },
            "load_mix" => Command::LoadMix {
                path: PathBuf::from(args.required("path")?),
            },
            "eq" => {
                let target = target(&mut args, None)?;
                let shape = match args.kw("type") {
                    Some(t) => EqShape::parse(&t)
                        .ok_or_else(|| CoreError::syntax(format!("unknown eq type: {}", t)))?,
                    None => EqShape::Bell,
                };
                Command::Eq {
                    target,
                    opts: EqOpts {
                        shape,
                        f: finite(args.kw_or("f", 1000.0)?, "f")?,
                        q: finite(args.kw_or("q", 1.0)?, "q")?,
                        g: finite(args.kw_or("g", 0.0)?, "g")?,
                    },
                }
            }
            "comp" => Command::Dynamics {
                target: target(&mut args, None)?,
                mode: DynamicsMode::Compressor,
                params: dynamics(&mut args, -18.0)?,
            },
            "gate" => {
                let target = target(&mut args, None)?;
                let mode = match args.kw("mode").as_deref().map(str::to_lowercase).as_deref() {
                    None | Some("gate") => GateMode::Gate,
                    Some("expander") => GateMode::Expander,
                    Some(other) => {
                        return Err(CoreError::syntax(format!("unknown gate mode: {}", other)))
                    }
                };
                Command::Dynamics {
                    target,
                    mode: DynamicsMode::Gate(mode),
                    params: dynamics(&mut args, -50.0)?,
                }
            }
            "sat" => {
                let target = target(&mut args, None)?;
                let kind = match args.kw("type") {
                    Some(t) => SatKind::parse(&t)
                        .ok_or_else(|| CoreError::syntax(format!("unknown saturation type: {}", t)))?,
                    None => SatKind::default(),
                };
                Command::Saturate {
                    target,
                    kind,
                    drive: finite(args.kw_or("drive", 1.0)?, "drive")?,
                }
            }
            "stereo" => Command::StereoWidth {
                target: target(&mut args, None)?,
                width: finite(args.kw_or("width", 1.0)?, "width")?,
            },
            "send" => Command::Send {
                track: args
                    .kw_as("track")?
                    .ok_or_else(|| CoreError::syntax("send needs track=<index>"))?,
                bus: args
                    .kw("bus")
                    .ok_or_else(|| CoreError::syntax("send needs bus=<name>"))?
                    .trim()
                    .to_lowercase(),
                level: finite(args.kw_or("level", 0.2)?, "level")?,
            },
            "sidechain" => {
                let src = match args.kw("src") {
                    Some(s) => match s.trim().parse::<usize>() {
                        Ok(i) => SidechainSource::Track(i),
                        Err(_) => SidechainSource::Role(s.trim().to_lowercase()),
                    },
                    None => SidechainSource::Track(0),
                };
                let mut spec = SidechainSpec::new(src, args.kw_or("dst", 1)?);
                spec.threshold_db = finite(args.kw_or("threshold_db", spec.threshold_db)?, "threshold_db")?;
                spec.ratio = finite(args.kw_or("ratio", spec.ratio)?, "ratio")?;
                spec.attack_ms = finite(args.kw_or("attack_ms", spec.attack_ms)?, "attack_ms")?;
                spec.release_ms = finite(args.kw_or("release_ms", spec.release_ms)?, "release_ms")?;
                Command::Sidechain(spec)
            }
            "transient" => Command::Transient {
                target: target(&mut args, Some(MixTarget::Master))?,
                attack: finite(args.kw_or("attack", 0.0)?, "attack")?,
                sustain: finite(args.kw_or("sustain", 0.0)?, "sustain")?,
            },
            "limiter" => {
                let off = args.flag("off");
                let limit = finite(args.kw_or("limit", 0.98)?, "limit")?;
                Command::Limiter {
                    limit: (!off).then_some(limit),
                }
            }
            "mono_below" => {
                let target = target(&mut args, Some(MixTarget::Master))?;
                if let MixTarget::Track(_) = target {
                    return Err(CoreError::syntax("mono_below applies to a bus or master"));
                }
                let off = args.flag("off");
                let hz = match args.kw_as::<f64>("hz")? {
                    Some(hz) => Some(finite(hz, "hz")?),
                    None if off => None,
                    None => Some(120.0),
                };
                Command::MonoBelow { target, hz }
            }
            "compile_mix" => Command::CompileMix {
                path: args.optional().map(PathBuf::from),
            },

            "export_wav" | "render" | "export_mp3" | "export_m4a" => {
                let kind = match name.as_str() {
                    "export_mp3" => ExportKind::Mp3,
                    "export_m4a" => ExportKind::M4a,
                    _ => ExportKind::Wav,
                };
                Command::Export {
                    kind,
                    path: args.optional().map(PathBuf::from),
                    opts: export_opts(&mut args, kind)?,
                }
            }
            "export_preview_mp3" => Command::Export {
                kind: ExportKind::PreviewMp3,
                path: Some(PathBuf::from(args.required("path")?)),
                opts: export_opts(&mut args, ExportKind::PreviewMp3)?,
            },
            "export_stems" | "export_busses" => {
                let kind = if name == "export_stems" {
                    ExportKind::Stems
                } else {
                    ExportKind::Busses
                };
                Command::Export {
                    kind,
                    path: Some(PathBuf::from(args.required("out_dir")?)),
                    opts: export_opts(&mut args, kind)?,
                }
            }
            "export_midi" => Command::Export {
                kind: ExportKind::Midi,
                path: Some(PathBuf::from(args.required("path")?)),
                opts: ExportOpts::default(),
            },

            other => return Err(CoreError::syntax(format!("unknown command '{}'", other))),
        };
        args.finish()?;
        Ok(cmd)
    }

    /// Commands suppressed by a dry run: everything that renders or exports.
    pub fn is_export(&self) -> bool {
        matches!(self, Command::Export { .. })
    }

    /// Commands that run before any project exists.
    pub fn needs_project(&self) -> bool {
        !matches!(
            self,
            Command::Include { .. }
                | Command::NewProject { .. }
                | Command::OpenProject { .. }
                | Command::ListDrumKits
        )
    }
}
