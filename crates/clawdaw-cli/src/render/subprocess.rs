//! Renderer run as a child process.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{RenderError, RenderGateway, RenderRequest};
use crate::config::RendererConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawns the configured renderer once per request.
#[derive(Debug, Clone)]
pub struct SubprocessGateway {
    renderer: RendererConfig,
    working_dir: Option<PathBuf>,
}

impl SubprocessGateway {
    pub fn new(renderer: RendererConfig) -> Self {
        Self {
            renderer,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn renderer(&self) -> &RendererConfig {
        &self.renderer
    }
}

impl RenderGateway for SubprocessGateway {
    fn render(&self, request: &RenderRequest<'_>, timeout: Duration) -> Result<Vec<u8>, RenderError> {
        let scratch = tempfile::tempdir().map_err(|e| RenderError::Io(e.to_string()))?;
        let request_path = scratch.path().join("request.json");
        let out_path = scratch
            .path()
            .join(format!("out.{}", request.options.format.extension()));

        let json = serde_json::to_vec(request).map_err(|e| RenderError::Io(e.to_string()))?;
        std::fs::write(&request_path, json).map_err(|e| RenderError::Io(e.to_string()))?;

        let mut cmd = Command::new(&self.renderer.executable);
        cmd.args(&self.renderer.args)
            .arg("--request")
            .arg(&request_path)
            .arg("--out")
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(executable = %self.renderer.executable, ?timeout, "spawning renderer");
        let mut child = cmd.spawn().map_err(|e| RenderError::Spawn {
            executable: self.renderer.executable.clone(),
            message: e.to_string(),
        })?;
        // The renderer blocks once a full pipe goes unread.
        let stderr = drain_in_background(child.stderr.take());

        // On timeout the reader is left detached; descendants of the killed
        // renderer may still hold the pipe open.
        let status = wait_with_timeout(&mut child, timeout)?;
        let stderr = join_drain(stderr);
        if !status.success() {
            return Err(RenderError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        std::fs::read(&out_path).map_err(|e| {
            RenderError::Io(format!(
                "renderer produced no output at {}: {}",
                out_path.display(),
                e
            ))
        })
    }
}

fn drain_in_background<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut s| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = s.read_to_end(&mut buf) {
                warn!(error = %e, "failed to read renderer output");
            }
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle.map(JoinHandle::join) {
        Some(Ok(buf)) => buf,
        Some(Err(_)) => {
            warn!("renderer output reader panicked");
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "failed to kill renderer");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "failed to reap renderer");
    }
}

/// Polls the child until it exits; kills it once `timeout` has passed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, RenderError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    kill(child);
                    return Err(RenderError::Timeout { timeout });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill(child);
                return Err(RenderError::Io(format!("failed to wait for renderer: {}", e)));
            }
        }
    }
}
