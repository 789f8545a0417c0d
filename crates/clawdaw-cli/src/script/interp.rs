//! Line-by-line script interpreter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use clawdaw_spec::hash::canonical_project_hash;
use clawdaw_spec::{CoreError, DerivedFacts};

use super::command::Command;
use super::exec::Session;

/// Run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop at the first error instead of recording a warning.
    pub strict: bool,
    /// Parse and apply everything except renders and exports.
    pub dry_run: bool,
}

/// Where a run stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Ready,
    Executing {
        line: usize,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        line: usize,
        text: String,
        code: &'static str,
        kind: &'static str,
        message: String,
    },
    Cancelled {
        line: usize,
    },
}

/// What one applied line did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Blank or comment.
    Skipped,
    Executed(Option<String>),
    /// An export skipped by a dry run.
    Suppressed,
    Included,
}

/// Summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub commands_executed: usize,
    pub suppressed: usize,
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub state: RunState,
    pub output: Vec<String>,
    pub derived: Option<DerivedFacts>,
    pub project_hash: Option<String>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.state == RunState::Ready
    }
}

/// Executes scripts against a [`Session`].
///
/// The interpreter is synchronous. A cancellation flag is checked between
/// lines, never inside a command.
#[derive(Debug)]
pub struct Interpreter {
    options: RunOptions,
    session: Session,
    cancel: Arc<AtomicBool>,
    commands_executed: usize,
    suppressed: usize,
    warnings: Vec<String>,
    output: Vec<String>,
    state: RunState,
    /// Canonical paths of the files being run, outermost first.
    include_stack: Vec<PathBuf>,
    base_dirs: Vec<PathBuf>,
}

impl Interpreter {
    pub fn new(session: Session, options: RunOptions) -> Self {
        Self {
            options,
            session,
            cancel: Arc::new(AtomicBool::new(false)),
            commands_executed: 0,
            suppressed: 0,
            warnings: Vec::new(),
            output: Vec::new(),
            state: RunState::Ready,
            include_stack: Vec::new(),
            base_dirs: Vec::new(),
        }
    }

    /// Setting the returned flag stops the run before its next line.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Applies one line. Errors are returned, not recorded.
    pub fn apply(&mut self, line: &str) -> Result<Applied, CoreError> {
        let Some(cmd) = Command::parse(line)? else {
            return Ok(Applied::Skipped);
        };
        if let Command::Include { path } = &cmd {
            self.include(path)?;
            return Ok(Applied::Included);
        }
        if self.options.dry_run && cmd.is_export() {
            debug!(command = ?cmd, "dry run: export suppressed");
            self.suppressed += 1;
            self.commands_executed += 1;
            return Ok(Applied::Suppressed);
        }
        let message = self.session.execute(&cmd)?;
        self.commands_executed += 1;
        if let Some(msg) = &message {
            self.output.push(msg.clone());
        }
        Ok(Applied::Executed(message))
    }

    /// Runs script text. Relative includes resolve against `base_dir`,
    /// or the working directory when it is `None`.
    pub fn run_script(&mut self, text: &str, base_dir: Option<&Path>) -> RunReport {
        let pushed = match base_dir {
            Some(dir) => {
                self.base_dirs.push(dir.to_path_buf());
                true
            }
            None => false,
        };
        self.run_lines(text, None);
        if pushed {
            self.base_dirs.pop();
        }
        self.report()
    }

    /// Runs a script file. Its includes resolve against its directory.
    pub fn run_file(&mut self, path: &Path) -> Result<RunReport, CoreError> {
        let (canonical, text) = read_script(path)?;
        let dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.include_stack.push(canonical);
        self.base_dirs.push(dir);
        self.run_lines(&text, None);
        self.base_dirs.pop();
        self.include_stack.pop();
        Ok(self.report())
    }

    pub fn report(&self) -> RunReport {
        let project = self.session.project();
        RunReport {
            commands_executed: self.commands_executed,
            suppressed: self.suppressed,
            warnings: self.warnings.clone(),
            state: self.state.clone(),
            output: self.output.clone(),
            derived: project.map(DerivedFacts::of),
            project_hash: project.and_then(|p| canonical_project_hash(p).ok()),
        }
    }

    fn run_lines(&mut self, text: &str, file: Option<&str>) {
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            if self.cancel.load(Ordering::SeqCst) {
                info!(line, "run cancelled");
                self.state = RunState::Cancelled { line };
                return;
            }
            let text = raw.trim();
            self.state = RunState::Executing { line };
            debug!(file = file.unwrap_or("<script>"), line, text, "line");
            match self.apply(text) {
                Ok(_) => {
                    if let RunState::Executing { .. } = self.state {
                        self.state = RunState::Ready;
                    }
                }
                Err(e) => self.record_error(file, line, text, e),
            }
            if self.state != RunState::Ready {
                return;
            }
        }
    }

    fn record_error(&mut self, file: Option<&str>, line: usize, text: &str, err: CoreError) {
        if self.options.strict {
            error!(line, text, error = %err, "script failed");
            self.state = RunState::Failed {
                file: file.map(str::to_string),
                line,
                text: text.to_string(),
                code: err.kind().code(),
                kind: err.kind().as_str(),
                message: err.to_string(),
            };
            return;
        }
        let warning = match file {
            Some(f) => format!("error {}:{}: {} ({})", f, line, text, err),
            None => format!("error line {}: {} ({})", line, text, err),
        };
        warn!("{}", warning);
        self.warnings.push(warning);
        self.state = RunState::Ready;
    }

    fn include(&mut self, path: &Path) -> Result<(), CoreError> {
        let resolved = match self.base_dirs.last() {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        let (canonical, text) = read_script(&resolved)?;
        if self.include_stack.contains(&canonical) {
            let chain = self
                .include_stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| display_name(p))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(CoreError::include(format!("include cycle: {}", chain)));
        }

        info!(path = %canonical.display(), "including");
        let name = display_name(&canonical);
        let dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.include_stack.push(canonical);
        self.base_dirs.push(dir);
        self.run_lines(&text, Some(&name));
        self.base_dirs.pop();
        self.include_stack.pop();
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_script(path: &Path) -> Result<(PathBuf, String), CoreError> {
    if !path.is_file() {
        return Err(CoreError::include(format!(
            "include not found: {}",
            path.display()
        )));
    }
    let canonical = path.canonicalize().map_err(|e| {
        CoreError::include(format!("cannot resolve {}: {}", path.display(), e))
    })?;
    let text = std::fs::read_to_string(&canonical).map_err(|e| {
        CoreError::include(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok((canonical, text))
}
