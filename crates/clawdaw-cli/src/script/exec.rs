//! Command execution against an explicit session context.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use clawdaw_backend_arrange::{apply_arrangement, load_arrange_spec};
use clawdaw_backend_mix::{compile_project_mix, MixPlan};
use clawdaw_backend_music::{
    audible_tracks, expand_project, midi, EventStream, ExpandOptions, RegionSelect, TrackSelect,
};
use clawdaw_spec::validation::migrate::{load_project_str, to_json_pretty, validate_and_migrate};
use clawdaw_spec::validation::references::analyze_references;
use clawdaw_spec::validation::validate_project;
use clawdaw_spec::{
    BackendError, CoreError, DerivedFacts, DrumKit, EqBand, EqKind, ErrorKind, FxChain, Humanize,
    Limiter, MixSpec, Note, Project, Region, ReturnFx, SamplerKind, Saturation, Section, Stereo,
    TrackMode, Transient,
};

use super::command::{
    Command, DynamicsMode, EqShape, ExportKind, ExportOpts, GateMode, MixTarget,
};
use crate::config::EngineConfig;
use crate::render::{
    RenderError, RenderFormat, RenderGateway, RenderOptions, RenderRequest, SubprocessGateway,
};

/// Maps a backend error onto the shared taxonomy by its kind.
pub(crate) fn core_error<E: BackendError>(err: &E) -> CoreError {
    let msg = err.message();
    match err.kind() {
        ErrorKind::Syntax => CoreError::syntax(msg),
        ErrorKind::Reference => CoreError::reference(msg),
        ErrorKind::Range => CoreError::range(msg),
        ErrorKind::Compile => CoreError::compile(msg),
        ErrorKind::Include => CoreError::include(msg),
        ErrorKind::RenderTimeout => CoreError::RenderTimeout {
            timeout_secs: err.timeout_secs().unwrap_or_default(),
        },
        ErrorKind::RenderFailure => CoreError::RenderFailure(msg),
    }
}

fn joined<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Lowercased file stem: spaces become `_`, anything outside
/// `[a-z0-9._-]` becomes `_`, runs of `_` collapse.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    if out.is_empty() {
        "project".to_string()
    } else {
        out
    }
}

fn read_input(path: &Path, what: &str) -> Result<String, CoreError> {
    std::fs::read_to_string(path).map_err(|e| {
        CoreError::reference(format!("cannot read {} {}: {}", what, path.display(), e))
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let fail = |e: std::io::Error| {
        CoreError::RenderFailure(format!("cannot write {}: {}", path.display(), e))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }
    std::fs::write(path, bytes).map_err(fail)
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CoreError::RenderFailure(format!("cannot serialize: {}", e)))
}

fn compile_mix(project: &Project) -> Result<MixPlan, CoreError> {
    compile_project_mix(project).map_err(|errors| CoreError::compile(joined(&errors)))
}

fn expand(project: &Project, options: &ExpandOptions) -> Result<EventStream, CoreError> {
    expand_project(project, options).map_err(|e| core_error(&e))
}

/// State threaded through one interpreter run: the current project and
/// where it lives, the engine configuration and the renderer.
pub struct Session {
    project: Option<Project>,
    project_path: Option<PathBuf>,
    config: EngineConfig,
    gateway: Option<Box<dyn RenderGateway>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("project", &self.project.as_ref().map(|p| &p.name))
            .field("project_path", &self.project_path)
            .field("config", &self.config)
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

impl Session {
    /// Uses a subprocess gateway when a renderer is configured.
    pub fn new(config: EngineConfig) -> Self {
        let gateway = config
            .renderer
            .clone()
            .map(|r| Box::new(SubprocessGateway::new(r)) as Box<dyn RenderGateway>);
        Self {
            project: None,
            project_path: None,
            config,
            gateway,
        }
    }

    pub fn with_gateway(mut self, gateway: Box<dyn RenderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn into_project(self) -> Option<Project> {
        self.project
    }

    fn current(&self) -> Result<&Project, CoreError> {
        self.project
            .as_ref()
            .ok_or_else(|| CoreError::reference("no project; run new_project or open_project first"))
    }

    fn current_mut(&mut self) -> Result<&mut Project, CoreError> {
        self.project
            .as_mut()
            .ok_or_else(|| CoreError::reference("no project; run new_project or open_project first"))
    }

    fn default_output(&self, project: &Project, ext: &str) -> PathBuf {
        self.config
            .out_dir
            .join(format!("{}.{}", sanitize_name(&project.name), ext))
    }

    /// Runs one command. Returns a message worth showing, if any.
    ///
    /// `include` is expanded by the interpreter and never reaches here.
    pub fn execute(&mut self, cmd: &Command) -> Result<Option<String>, CoreError> {
        debug!(command = ?cmd, "executing");
        match cmd {
            Command::Include { path } => Err(CoreError::include(format!(
                "include {} outside a script",
                path.display()
            ))),
            Command::NewProject { name, bpm } => {
                let mut project = Project::new(name.trim(), 120.0);
                project.set_bpm(*bpm)?;
                self.project = Some(project);
                self.project_path = None;
                Ok(Some(format!("new project '{}' at {} bpm", name, bpm)))
            }
            Command::OpenProject { path } => self.open(path),
            Command::SaveProject { path } => {
                let project = self.current()?;
                let target = path
                    .clone()
                    .or_else(|| self.project_path.clone())
                    .unwrap_or_else(|| self.default_output(project, "json"));
                let text = to_json_pretty(project)
                    .map_err(|e| CoreError::RenderFailure(e.to_string()))?;
                write_output(&target, text.as_bytes())?;
                self.project_path = Some(target.clone());
                Ok(Some(format!("saved {}", target.display())))
            }
            Command::ValidateProject => {
                let project = self.current_mut()?;
                let report = validate_and_migrate(project);
                for entry in &report.entries {
                    warn!(field = %entry.field, reason = %entry.reason, "repaired");
                }
                let result = validate_project(project);
                if let Some(first) = result.errors.first() {
                    return Err(match first.code.kind() {
                        ErrorKind::Reference => CoreError::reference(first.to_string()),
                        ErrorKind::Range => CoreError::range(first.to_string()),
                        _ => CoreError::compile(first.to_string()),
                    });
                }
                Ok(Some(format!(
                    "project valid ({} repair(s), {} warning(s))",
                    report.entries.len(),
                    result.warnings.len()
                )))
            }
            Command::DumpState { path } => {
                let project = self.current()?;
                let mut doc = serde_json::to_value(project)
                    .map_err(|e| CoreError::RenderFailure(e.to_string()))?;
                if let serde_json::Value::Object(map) = &mut doc {
                    let derived = serde_json::to_value(DerivedFacts::of(project))
                        .map_err(|e| CoreError::RenderFailure(e.to_string()))?;
                    map.insert("derived".to_string(), derived);
                }
                write_output(path, to_pretty(&doc)?.as_bytes())?;
                Ok(Some(format!("state written to {}", path.display())))
            }
            Command::AnalyzeRefs { path } => {
                let report = analyze_references(self.current()?);
                write_output(path, to_pretty(&report)?.as_bytes())?;
                Ok(Some(format!(
                    "{} missing, {} unused pattern reference(s)",
                    report.missing.len(),
                    report.unused.len()
                )))
            }

            Command::AddTrack { name, program } => {
                let project = self.current_mut()?;
                let index =
                    project.add_track(name, TrackMode::GmInstrument { program: *program })?;
                Ok(Some(format!("track {} '{}'", index, name)))
            }
            Command::DeleteTrack { track } => {
                let project = self.current_mut()?;
                let index = match track {
                    Some(i) => *i,
                    None => project
                        .tracks
                        .len()
                        .checked_sub(1)
                        .ok_or_else(|| CoreError::reference("no tracks to delete"))?,
                };
                let removed = project.delete_track(index)?;
                Ok(Some(format!("deleted track {} '{}'", index, removed.name)))
            }
            Command::SetProgram { track, program } => {
                self.current_mut()?.set_program(*track, *program)?;
                Ok(None)
            }
            Command::SetMixer {
                track,
                param,
                value,
            } => {
                self.current_mut()?.set_mixer(*track, *param, *value)?;
                Ok(None)
            }
            Command::SetBus { track, bus } => {
                let bus = match bus.trim().to_lowercase().as_str() {
                    "auto" | "none" => None,
                    _ => Some(bus.as_str()),
                };
                self.current_mut()?.set_bus(*track, bus)?;
                Ok(None)
            }
            Command::SetSampler { track, kind } => {
                self.current_mut()?.set_sampler(*track, *kind)?;
                Ok(None)
            }
            Command::SetSamplerPreset { track, preset } => {
                self.current_mut()?.set_preset(*track, preset)?;
                Ok(None)
            }
            Command::SetKit { track, preset } => self.sampler_with_preset(*track, SamplerKind::Drums, preset),
            Command::Set808 { track, preset } => {
                self.sampler_with_preset(*track, SamplerKind::Bass808, preset)
            }
            Command::SetDrumKit { track, kit } => {
                let kit = self.current_mut()?.set_drum_kit(*track, kit)?;
                Ok(Some(format!("track {} drum kit {}", track, kit.name())))
            }
            Command::ListDrumKits => Ok(Some(
                DrumKit::ALL
                    .iter()
                    .map(|k| k.name())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            Command::SetInstrument {
                track,
                id,
                preset,
                seed,
            } => {
                self.current_mut()?.set_instrument(
                    *track,
                    id,
                    preset.as_deref(),
                    *seed,
                    BTreeMap::new(),
                )?;
                Ok(None)
            }
            Command::SetGlide { track, glide } => {
                let project = self.current_mut()?;
                let ticks = glide.ticks(project.time_base())?;
                project.set_glide(*track, ticks)?;
                Ok(None)
            }
            Command::SetHumanize { track, opts } => {
                let project = self.current_mut()?;
                let current = project.track(*track)?.humanize;
                project.set_humanize(
                    *track,
                    Humanize {
                        timing: opts.timing.unwrap_or(current.timing),
                        velocity: opts.velocity.unwrap_or(current.velocity),
                        seed: opts.seed.unwrap_or(current.seed),
                    },
                )?;
                Ok(None)
            }
            Command::Mute { track, on } => {
                self.current_mut()?.track_mut(*track)?.mute = *on;
                Ok(None)
            }
            Command::Solo { track, on } => {
                self.current_mut()?.track_mut(*track)?.solo = *on;
                Ok(None)
            }

            Command::SetBpm { bpm } => {
                self.current_mut()?.set_bpm(*bpm)?;
                Ok(None)
            }
            Command::SetSwing { percent } => {
                self.current_mut()?.set_swing(*percent)?;
                Ok(None)
            }
            Command::SetLoop { start, end } => {
                let project = self.current_mut()?;
                let tb = project.time_base();
                project.set_loop(start.ticks(tb)?, end.ticks(tb)?)?;
                Ok(None)
            }
            Command::ClearLoop => {
                self.current_mut()?.loop_region = None;
                Ok(None)
            }
            Command::SetRenderRegion { start, end } => {
                let project = self.current_mut()?;
                let tb = project.time_base();
                project.set_render_region(start.ticks(tb)?, end.ticks(tb)?)?;
                Ok(None)
            }
            Command::ClearRenderRegion => {
                self.current_mut()?.render_region = None;
                Ok(None)
            }

            Command::NewPattern {
                track,
                name,
                length,
            } => {
                let project = self.current_mut()?;
                let ticks = length.ticks(project.time_base())?;
                project.new_pattern(*track, name, ticks)?;
                Ok(None)
            }
            Command::RenamePattern { track, old, new } => {
                self.current_mut()?.rename_pattern(*track, old, new)?;
                Ok(None)
            }
            Command::DeletePattern { track, name } => {
                let dropped = self.current_mut()?.delete_pattern(*track, name)?;
                Ok((dropped > 0).then(|| format!("removed {} clip(s) of '{}'", dropped, name)))
            }
            Command::DuplicatePattern { track, src, dst } => {
                self.current_mut()?.duplicate_pattern(*track, src, dst)?;
                Ok(None)
            }
            Command::PatternTranspose {
                track,
                name,
                semitones,
            } => {
                self.current_mut()?
                    .transform_pattern(*track, name, |p| p.transpose(*semitones))?;
                Ok(None)
            }
            Command::PatternShift { track, name, delta } => {
                let project = self.current_mut()?;
                let ticks = delta.delta(project.time_base())?;
                project.transform_pattern(*track, name, |p| {
                    p.shift(ticks);
                    Ok(())
                })?;
                Ok(None)
            }
            Command::PatternStretch {
                track,
                name,
                factor,
            } => {
                self.current_mut()?
                    .transform_pattern(*track, name, |p| p.stretch(*factor))?;
                Ok(None)
            }
            Command::PatternReverse { track, name } => {
                self.current_mut()?.transform_pattern(*track, name, |p| {
                    p.reverse();
                    Ok(())
                })?;
                Ok(None)
            }
            Command::PatternVelocity { track, name, scale } => {
                self.current_mut()?
                    .transform_pattern(*track, name, |p| p.velocity_scale(*scale))?;
                Ok(None)
            }
            Command::AddNote {
                track,
                pattern,
                key,
                start,
                duration,
                opts,
            } => {
                let project = self.current_mut()?;
                let tb = project.time_base();
                let mut note = Note::new(key.clone(), start.ticks(tb)?, duration.ticks(tb)?, opts.velocity);
                note.chance = opts.chance;
                note.mute = opts.mute;
                note.accent = opts.accent;
                if let Some(glide) = &opts.glide {
                    note.glide_ticks = glide.ticks(tb)?;
                }
                project.add_note_to_pattern(*track, pattern, note)?;
                Ok(None)
            }
            Command::PlacePattern {
                track,
                pattern,
                start,
                repeats,
            } => {
                let project = self.current_mut()?;
                let tick = start.ticks(project.time_base())?;
                let clip = project.place_clip(*track, pattern, tick, *repeats)?;
                Ok(Some(format!("track {} clip {}", track, clip)))
            }
            Command::MoveClip { track, clip, start } => {
                let project = self.current_mut()?;
                let tick = start.ticks(project.time_base())?;
                project.move_clip(*track, *clip, tick)?;
                Ok(None)
            }
            Command::DeleteClip { track, clip } => {
                self.current_mut()?.delete_clip(*track, *clip)?;
                Ok(None)
            }
            Command::CopyBars {
                track,
                src_bar,
                bars,
                dst_bar,
            } => {
                let only = track.map(|t| [t]);
                let copied = self.current_mut()?.copy_bars(
                    *src_bar,
                    *bars,
                    *dst_bar,
                    only.as_ref().map(|t| &t[..]),
                )?;
                Ok(Some(format!("copied {} clip(s)", copied)))
            }
            Command::ClearClips { track } => {
                let n = self.current_mut()?.clear_clips(*track)?;
                Ok(Some(format!("cleared {} clip(s)", n)))
            }
            Command::AddSection {
                name,
                start_bar,
                length_bars,
            } => {
                self.current_mut()?
                    .add_section(Section::new(name.as_str(), *start_bar, *length_bars))?;
                Ok(None)
            }

            Command::ApplyArrangement { path } => {
                let spec = load_arrange_spec(path).map_err(|e| core_error(&e))?;
                let project = self.current_mut()?;
                let compiled = apply_arrangement(project, &spec)
                    .map_err(|errors| CoreError::compile(joined(&errors)))?;
                info!(clips = compiled.clip_count(), "arrangement applied");
                Ok(Some(format!("arranged {} clip(s)", compiled.clip_count())))
            }
            Command::LoadMix { path } => {
                let mix = load_mix_spec(path)?;
                self.current_mut()?.mix = mix;
                Ok(Some(format!("mix loaded from {}", path.display())))
            }
            Command::Eq { target, opts } => {
                let project = self.current_mut()?;
                let fx = fx_chain(project, target)?;
                match opts.shape {
                    EqShape::Highpass => fx.highpass_hz = Some(opts.f),
                    EqShape::Lowpass => fx.lowpass_hz = Some(opts.f),
                    shape => {
                        let kind = match shape {
                            EqShape::LowShelf => EqKind::LowShelf,
                            EqShape::HighShelf => EqKind::HighShelf,
                            _ => EqKind::Bell,
                        };
                        fx.eq.push(EqBand {
                            kind,
                            f: opts.f,
                            q: opts.q,
                            g: opts.g,
                        });
                    }
                }
                Ok(None)
            }
            Command::Dynamics {
                target,
                mode,
                params,
            } => {
                let fx = fx_chain(self.current_mut()?, target)?;
                let slot = match mode {
                    DynamicsMode::Compressor => &mut fx.comp,
                    DynamicsMode::Gate(GateMode::Gate) => &mut fx.gate,
                    DynamicsMode::Gate(GateMode::Expander) => &mut fx.expander,
                };
                *slot = Some(params.clone());
                Ok(None)
            }
            Command::Saturate {
                target,
                kind,
                drive,
            } => {
                fx_chain(self.current_mut()?, target)?.sat = Some(Saturation {
                    kind: *kind,
                    drive: *drive,
                });
                Ok(None)
            }
            Command::StereoWidth { target, width } => {
                fx_chain(self.current_mut()?, target)?.stereo = Some(Stereo { width: *width });
                Ok(None)
            }
            Command::Send { track, bus, level } => {
                let project = self.current_mut()?;
                project.track(*track)?;
                if !project.mix.busses.contains_key(bus) {
                    let bus_mix = project.mix.bus_mut(bus);
                    bus_mix.return_fx = Some(if bus.contains("delay") {
                        ReturnFx::delay()
                    } else {
                        ReturnFx::reverb()
                    });
                    debug!(bus = %bus, "declared send bus");
                }
                project.mix.track_mut(*track).sends.insert(bus.clone(), *level);
                Ok(None)
            }
            Command::Sidechain(spec) => {
                let project = self.current_mut()?;
                project.track(spec.dst)?;
                project.mix.sidechain.push(spec.clone());
                Ok(None)
            }
            Command::Transient {
                target,
                attack,
                sustain,
            } => {
                fx_chain(self.current_mut()?, target)?.transient = Some(Transient {
                    attack: *attack,
                    sustain: *sustain,
                });
                Ok(None)
            }
            Command::Limiter { limit } => {
                self.current_mut()?.mix.master.limiter = limit.map(|limit| Limiter { limit });
                Ok(None)
            }
            Command::MonoBelow { target, hz } => {
                let project = self.current_mut()?;
                match target {
                    MixTarget::Master => project.mix.master.mono_below_hz = *hz,
                    MixTarget::Bus(bus) => project.mix.bus_mut(bus).mono_below_hz = *hz,
                    MixTarget::Track(_) => {
                        return Err(CoreError::syntax("mono_below applies to a bus or master"))
                    }
                }
                Ok(None)
            }
            Command::CompileMix { path } => {
                let plan = compile_mix(self.current()?)?;
                if let Some(path) = path {
                    write_output(path, to_pretty(&plan)?.as_bytes())?;
                }
                Ok(Some(format!(
                    "mix compiled: {} node(s), {} stage(s)",
                    plan.schedule.len(),
                    plan.stage_count()
                )))
            }

            Command::Export { kind, path, opts } => self.export(*kind, path.as_deref(), opts),
        }
    }

    fn open(&mut self, path: &Path) -> Result<Option<String>, CoreError> {
        let text = read_input(path, "project")?;
        let (project, report) =
            load_project_str(&text).map_err(|e| CoreError::syntax(format!("{}: {}", path.display(), e)))?;
        for entry in &report.entries {
            warn!(field = %entry.field, reason = %entry.reason, "migrated");
        }
        let msg = format!(
            "opened '{}' (schema {} -> {}, {} change(s))",
            project.name,
            report.from_version,
            report.to_version,
            report.entries.len()
        );
        self.project = Some(project);
        self.project_path = Some(path.to_path_buf());
        Ok(Some(msg))
    }

    fn sampler_with_preset(
        &mut self,
        track: usize,
        kind: SamplerKind,
        preset: &str,
    ) -> Result<Option<String>, CoreError> {
        let project = self.current_mut()?;
        let before = project.track(track)?.mode.clone();
        project.set_sampler(track, Some(kind))?;
        if let Err(e) = project.set_preset(track, preset) {
            project.track_mut(track)?.mode = before;
            return Err(e);
        }
        Ok(None)
    }

    fn export(
        &self,
        kind: ExportKind,
        path: Option<&Path>,
        opts: &ExportOpts,
    ) -> Result<Option<String>, CoreError> {
        let base = self.current()?;

        if kind == ExportKind::Midi {
            let target = path.map(Path::to_path_buf).unwrap_or_else(|| self.default_output(base, "mid"));
            let events = expand(base, &ExpandOptions::default())?;
            let bytes = midi::to_smf_bytes(&events).map_err(|e| core_error(&e))?;
            write_output(&target, &bytes)?;
            return Ok(Some(exported(&target, &bytes)));
        }

        let soundfont = self
            .config
            .soundfont_path
            .clone()
            .ok_or_else(|| CoreError::RenderFailure("soundfont not set".into()))?;
        let gateway = self.gateway.as_deref().ok_or(RenderError::NotConfigured)?;

        let overridden;
        let project = match &opts.mix {
            Some(mix_path) => {
                let mut copy = base.clone();
                copy.mix = load_mix_spec(mix_path)?;
                overridden = copy;
                &overridden
            }
            None => base,
        };
        let plan = compile_mix(project)?;
        let timeout = Duration::from_secs(self.config.render_timeout_secs);

        let options = |format: RenderFormat| RenderOptions {
            soundfont: Some(soundfont.clone()),
            preset: Some(opts.preset.clone()),
            fade_secs: opts.fade,
            sample_rate: opts.sample_rate,
            bitrate: opts.bitrate.clone(),
            trim_secs: opts.trim,
            ..RenderOptions::new(format)
        };
        let render = |expand_opts: ExpandOptions, format: RenderFormat, target: &Path| {
            let events = expand(project, &expand_opts)?;
            let request = RenderRequest::new(project, &plan, &events, options(format));
            info!(target = %target.display(), format = format.extension(), "rendering");
            let bytes = gateway.render(&request, timeout)?;
            write_output(target, &bytes)?;
            Ok::<_, CoreError>(bytes)
        };

        match kind {
            ExportKind::Wav | ExportKind::Mp3 | ExportKind::M4a => {
                let format = match kind {
                    ExportKind::Mp3 => RenderFormat::Mp3,
                    ExportKind::M4a => RenderFormat::M4a,
                    _ => RenderFormat::Wav,
                };
                let target = path
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.default_output(project, format.extension()));
                let bytes = render(ExpandOptions::default(), format, &target)?;
                Ok(Some(exported(&target, &bytes)))
            }
            ExportKind::PreviewMp3 => {
                let tb = project.time_base();
                let start = match &opts.start {
                    Some(t) => t.ticks(tb)?,
                    None => project.render_region.map(|r| r.start).unwrap_or(0),
                };
                let end = start + tb.bars(i64::from(opts.bars));
                let expand_opts = ExpandOptions {
                    region: RegionSelect::Explicit(Region::new(start, end)?),
                    ..ExpandOptions::default()
                };
                let target = path
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.default_output(project, "preview.mp3"));
                let bytes = render(expand_opts, RenderFormat::Mp3, &target)?;
                Ok(Some(exported(&target, &bytes)))
            }
            ExportKind::Stems => {
                let dir = path.map(Path::to_path_buf).unwrap_or_else(|| self.config.out_dir.join("stems"));
                let mut written = 0;
                for index in audible_tracks(project) {
                    let name = sanitize_name(&project.track(index)?.name);
                    let target = dir.join(format!("{}_{}.wav", index, name));
                    let expand_opts = ExpandOptions {
                        tracks: TrackSelect::Only(BTreeSet::from([index])),
                        ..ExpandOptions::default()
                    };
                    render(expand_opts, RenderFormat::Wav, &target)?;
                    written += 1;
                }
                Ok(Some(format!("{} stem(s) written to {}", written, dir.display())))
            }
            ExportKind::Busses => {
                let dir = path.map(Path::to_path_buf).unwrap_or_else(|| self.config.out_dir.join("busses"));
                let audible = audible_tracks(project);
                let mut written = 0;
                for (name, bus) in &plan.busses {
                    let members: BTreeSet<usize> = bus
                        .members
                        .iter()
                        .copied()
                        .filter(|i| audible.contains(i))
                        .collect();
                    if members.is_empty() {
                        debug!(bus = %name, "skipping silent bus");
                        continue;
                    }
                    let target = dir.join(format!("{}.wav", sanitize_name(name)));
                    let expand_opts = ExpandOptions {
                        tracks: TrackSelect::Only(members),
                        ..ExpandOptions::default()
                    };
                    render(expand_opts, RenderFormat::Wav, &target)?;
                    written += 1;
                }
                Ok(Some(format!("{} bus stem(s) written to {}", written, dir.display())))
            }
            ExportKind::Midi => Ok(None),
        }
    }
}

fn exported(path: &Path, bytes: &[u8]) -> String {
    format!(
        "wrote {} ({} bytes, blake3 {})",
        path.display(),
        bytes.len(),
        blake3::hash(bytes).to_hex()
    )
}

fn load_mix_spec(path: &Path) -> Result<MixSpec, CoreError> {
    let text = read_input(path, "mix spec")?;
    serde_json::from_str(&text)
        .map_err(|e| CoreError::syntax(format!("malformed mix spec {}: {}", path.display(), e)))
}

/// The effect chain a mix command edits, created empty if missing.
fn fx_chain<'a>(project: &'a mut Project, target: &MixTarget) -> Result<&'a mut FxChain, CoreError> {
    Ok(match target {
        MixTarget::Track(i) => {
            project.track(*i)?;
            &mut project.mix.track_mut(*i).fx
        }
        MixTarget::Bus(name) => &mut project.mix.bus_mut(name).fx,
        MixTarget::Master => &mut project.mix.master.fx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MemoryGateway;
    use pretty_assertions::assert_eq;

    fn run(session: &mut Session, line: &str) -> Result<Option<String>, CoreError> {
        let cmd = Command::parse(line)?.ok_or_else(|| CoreError::syntax("blank"))?;
        session.execute(&cmd)
    }

    fn session_with(lines: &[&str]) -> Session {
        let mut session = Session::new(EngineConfig::default());
        for line in lines {
            run(&mut session, line).unwrap();
        }
        session
    }

    #[test]
    fn render_errors_keep_their_kind() {
        let timeout = RenderError::Timeout {
            timeout: Duration::from_secs(42),
        };
        let mapped = core_error(&timeout);
        assert_eq!(mapped, CoreError::RenderTimeout { timeout_secs: 42 });
        assert_eq!(mapped.kind(), ErrorKind::RenderTimeout);
        assert_eq!(mapped, CoreError::from(timeout));

        let failed = RenderError::Failed {
            code: 2,
            stderr: "boom".into(),
        };
        assert_eq!(core_error(&failed).kind(), ErrorKind::RenderFailure);
    }

    #[test]
    fn sanitizes_output_names() {
        assert_eq!(sanitize_name("My Song!! v2"), "my_song_v2");
        assert_eq!(sanitize_name("  "), "project");
        assert_eq!(sanitize_name("lo-fi.beat"), "lo-fi.beat");
    }

    #[test]
    fn commands_need_a_project() {
        let mut session = Session::new(EngineConfig::default());
        let err = run(&mut session, "add_track Bass 33").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert!(run(&mut session, "list_drum_kits").unwrap().is_some());
    }

    #[test]
    fn builds_a_project() {
        let session = session_with(&[
            "new_project demo 96",
            "add_track Drums",
            "set_kit 0 punchy",
            "new_pattern 0 main 1:0",
            "add_note_pat 0 main kick 0 0:0:120 chance=0.75",
            "place_pattern 0 main 0 4",
            "set_humanize 0 timing=10",
            "set_humanize 0 velocity=5",
            "set_volume 0 90",
        ]);
        let project = session.project().unwrap();
        assert_eq!(project.bpm, 96.0);
        let track = &project.tracks[0];
        assert_eq!(
            track.mode,
            TrackMode::Sampler {
                sampler: SamplerKind::Drums,
                preset: "punchy".into()
            }
        );
        assert_eq!(track.humanize.timing, 10);
        assert_eq!(track.humanize.velocity, 5);
        assert_eq!(track.mixer.volume, 90);
        assert_eq!(track.patterns["main"].notes[0].chance, 0.75);
        assert_eq!(track.clips[0].repeats, 4);
    }

    #[test]
    fn setters_report_range_errors() {
        let mut session = session_with(&["new_project demo", "add_track Keys"]);
        assert_eq!(
            run(&mut session, "set_pan 0 200").unwrap_err().kind(),
            ErrorKind::Range
        );
        assert_eq!(
            run(&mut session, "set_bpm 1000").unwrap_err().kind(),
            ErrorKind::Range
        );
        assert_eq!(
            run(&mut session, "set_volume 3 100").unwrap_err().kind(),
            ErrorKind::Reference
        );
    }

    #[test]
    fn mix_commands_edit_the_mix_spec() {
        let session = session_with(&[
            "new_project demo",
            "add_track Kick",
            "add_track Bass bass",
            "eq track=1 type=hp f=35",
            "eq track=1 type=bell f=200 q=1.5 g=-3",
            "comp bus=drums threshold_db=-10",
            "gate track=0 mode=expander",
            "send track=1 bus=delay level=0.3",
            "sidechain src=kick dst=1",
            "limiter limit=0.95",
            "mono_below hz=100",
            "transient attack=0.2 sustain=-0.1",
        ]);
        let mix = &session.project().unwrap().mix;
        let bass = mix.track(1).unwrap();
        assert_eq!(bass.fx.highpass_hz, Some(35.0));
        assert_eq!(bass.fx.eq.len(), 1);
        assert_eq!(bass.sends["delay"], 0.3);
        assert_eq!(mix.busses["delay"].return_fx, Some(ReturnFx::delay()));
        assert_eq!(mix.busses["drums"].fx.comp.as_ref().unwrap().threshold_db, -10.0);
        assert!(mix.track(0).unwrap().fx.expander.is_some());
        assert_eq!(mix.sidechain.len(), 1);
        assert_eq!(mix.master.limiter, Some(Limiter { limit: 0.95 }));
        assert_eq!(mix.master.mono_below_hz, Some(100.0));
        assert!(mix.master.fx.transient.is_some());
    }

    #[test]
    fn set_kit_with_bad_preset_leaves_track_alone() {
        let mut session = session_with(&["new_project demo", "add_track Drums 0"]);
        assert!(run(&mut session, r#"set_kit 0 """#).is_err());
        assert_eq!(
            session.project().unwrap().tracks[0].mode,
            TrackMode::GmInstrument { program: 0 }
        );
    }

    #[test]
    fn audio_export_needs_soundfont_and_renderer() {
        let mut session = session_with(&["new_project demo", "add_track Keys"]);
        let err = run(&mut session, "export_wav out.wav").unwrap_err();
        assert_eq!(err, CoreError::RenderFailure("soundfont not set".into()));

        let config = EngineConfig {
            soundfont_path: Some("gm.sf2".into()),
            ..EngineConfig::default()
        };
        let mut session = Session::new(config);
        run(&mut session, "new_project demo").unwrap();
        let err = run(&mut session, "export_wav out.wav").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailure);
        assert!(err.to_string().contains("no renderer configured"));
    }

    #[test]
    fn export_passes_options_to_the_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MemoryGateway::new(b"ID3".to_vec());
        let config = EngineConfig {
            soundfont_path: Some("gm.sf2".into()),
            out_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let mut session = Session::new(config).with_gateway(Box::new(gateway.clone()));
        for line in [
            "new_project \"Night Drive\"",
            "add_track Keys",
            "new_pattern 0 main 1:0",
            "add_note_pat 0 main 60 0 480",
            "place_pattern 0 main 0 2",
        ] {
            run(&mut session, line).unwrap();
        }
        let msg = run(&mut session, "export_mp3 br=192k fade=0.5 preset=clean")
            .unwrap()
            .unwrap();
        assert!(msg.contains("night_drive.mp3"));
        assert!(msg.contains("blake3"));
        assert_eq!(std::fs::read(dir.path().join("night_drive.mp3")).unwrap(), b"ID3");

        let seen = gateway.requests();
        assert_eq!(seen[0]["options"]["bitrate"], "192k");
        assert_eq!(seen[0]["options"]["preset"], "clean");
        assert_eq!(seen[0]["options"]["soundfont"], "gm.sf2");
    }

    #[test]
    fn stems_render_one_request_per_audible_track() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MemoryGateway::new(b"RIFF".to_vec());
        let config = EngineConfig {
            soundfont_path: Some("gm.sf2".into()),
            ..EngineConfig::default()
        };
        let mut session = Session::new(config).with_gateway(Box::new(gateway.clone()));
        for line in ["new_project demo", "add_track Kick", "add_track Bass", "add_track Pad", "mute 2"] {
            run(&mut session, line).unwrap();
        }
        let out = dir.path().join("stems");
        run(&mut session, &format!("export_stems \"{}\"", out.display())).unwrap();
        assert!(out.join("0_kick.wav").exists());
        assert!(out.join("1_bass.wav").exists());
        assert!(!out.join("2_pad.wav").exists());
        assert_eq!(gateway.requests().len(), 2);
    }

    #[test]
    fn midi_export_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&[
            "new_project demo",
            "add_track Keys",
            "new_pattern 0 main 1:0",
            "add_note_pat 0 main 64 0 240",
            "place_pattern 0 main 0",
        ]);
        let path = dir.path().join("song.mid");
        run(&mut session, &format!("export_midi \"{}\"", path.display())).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut session = session_with(&["new_project demo 100", "add_track Keys piano"]);
        run(&mut session, &format!("save_project \"{}\"", path.display())).unwrap();

        let mut other = Session::new(EngineConfig::default());
        run(&mut other, &format!("open_project \"{}\"", path.display())).unwrap();
        assert_eq!(other.project(), session.project());
        // a second save goes back to the opened file
        run(&mut other, "set_bpm 101").unwrap();
        run(&mut other, "save_project").unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("101"));
    }

    #[test]
    fn dump_state_adds_derived_facts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut session = session_with(&[
            "new_project demo 120",
            "add_track Keys",
            "new_pattern 0 main 1:0",
            "place_pattern 0 main 0 2",
        ]);
        run(&mut session, &format!("dump_state \"{}\"", path.display())).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["derived"]["song_length_ticks"], 3840);
        assert_eq!(doc["derived"]["song_length_seconds"], 4.0);
        assert_eq!(doc["name"], "demo");
    }

    #[test]
    fn compile_mix_reports_cycles() {
        let mut session = session_with(&[
            "new_project demo",
            "add_track A",
            "add_track B",
            "sidechain src=0 dst=1",
            "sidechain src=1 dst=0",
        ]);
        let err = run(&mut session, "compile_mix").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
    }

    #[test]
    fn delete_track_defaults_to_last() {
        let mut session = session_with(&["new_project demo", "add_track A", "add_track B"]);
        let msg = run(&mut session, "delete_track").unwrap().unwrap();
        assert!(msg.contains("'B'"));
        assert_eq!(session.project().unwrap().tracks.len(), 1);
    }
}
