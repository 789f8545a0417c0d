//! Boundary to the external renderer.
//!
//! Audio synthesis happens outside this crate. A [`RenderGateway`] receives
//! the project, its compiled mix plan and the expanded note events, and
//! returns encoded audio bytes. Calls are synchronous with a caller-chosen
//! timeout; a timeout is its own error, never folded into a failure.
//!
//! # Renderer protocol
//!
//! [`SubprocessGateway`] runs `<exe> <args...> --request <json> --out <path>`.
//! The renderer reads the request document, writes the audio to the out
//! path and exits 0. Any other exit code is a failure carrying stderr.

mod subprocess;


use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use clawdaw_backend_mix::MixPlan;
use clawdaw_backend_music::EventStream;
use clawdaw_spec::{BackendError, CoreError, ErrorKind, Project};

pub use subprocess::SubprocessGateway;

/// Output format a render produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    Wav,
    Mp3,
    M4a,
}

impl RenderFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RenderFormat::Wav => "wav",
            RenderFormat::Mp3 => "mp3",
            RenderFormat::M4a => "m4a",
        }
    }
}

/// Per-render settings passed through to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOptions {
    pub format: RenderFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soundfont: Option<PathBuf>,
    /// Mastering preset name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_secs: Option<f64>,
    pub sample_rate: u32,
    /// Encoder bitrate for lossy formats, e.g. `192k`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// Cut the render to this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_secs: Option<f64>,
}

impl RenderOptions {
    pub fn new(format: RenderFormat) -> Self {
        Self {
            format,
            soundfont: None,
            preset: None,
            fade_secs: None,
            sample_rate: 44_100,
            bitrate: None,
            trim_secs: None,
        }
    }
}

/// Everything a renderer needs for one render.
#[derive(Debug, Serialize)]
pub struct RenderRequest<'a> {
    pub project: &'a Project,
    pub plan: &'a MixPlan,
    /// ffmpeg-style `filter_complex` for the plan.
    pub filtergraph: String,
    pub events: &'a EventStream,
    pub options: RenderOptions,
}

impl<'a> RenderRequest<'a> {
    pub fn new(
        project: &'a Project,
        plan: &'a MixPlan,
        events: &'a EventStream,
        options: RenderOptions,
    ) -> Self {
        Self {
            project,
            plan,
            filtergraph: plan.to_filtergraph(),
            events,
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("no renderer configured (set `renderer` in the config file or {})", crate::config::ENV_RENDERER)]
    NotConfigured,
    #[error("failed to start renderer '{executable}': {message}")]
    Spawn { executable: String, message: String },
    #[error("renderer timed out after {:.1}s", timeout.as_secs_f64())]
    Timeout { timeout: Duration },
    #[error("renderer exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },
    #[error("renderer i/o error: {0}")]
    Io(String),
}

impl BackendError for RenderError {
    fn code(&self) -> &'static str {
        match self {
            RenderError::NotConfigured => "RENDER_001",
            RenderError::Spawn { .. } => "RENDER_002",
            RenderError::Timeout { .. } => "RENDER_003",
            RenderError::Failed { .. } => "RENDER_004",
            RenderError::Io(_) => "RENDER_005",
        }
    }

    fn category(&self) -> &'static str {
        "render"
    }

    fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Timeout { .. } => ErrorKind::RenderTimeout,
            _ => ErrorKind::RenderFailure,
        }
    }

    fn timeout_secs(&self) -> Option<u64> {
        match self {
            RenderError::Timeout { timeout } => Some(timeout.as_secs()),
            _ => None,
        }
    }
}

impl From<RenderError> for CoreError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout { timeout } => CoreError::RenderTimeout {
                timeout_secs: timeout.as_secs(),
            },
            other => CoreError::RenderFailure(other.to_string()),
        }
    }
}

/// A renderer.
pub trait RenderGateway {
    /// Renders `request`, giving up after `timeout`.
    fn render(&self, request: &RenderRequest<'_>, timeout: Duration) -> Result<Vec<u8>, RenderError>;
}

/// In-process gateway that records every request as JSON and answers with
/// fixed bytes. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    bytes: Vec<u8>,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MemoryGateway {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            requests: Arc::default(),
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl RenderGateway for MemoryGateway {
    fn render(&self, request: &RenderRequest<'_>, _timeout: Duration) -> Result<Vec<u8>, RenderError> {
        let value = serde_json::to_value(request).map_err(|e| RenderError::Io(e.to_string()))?;
        self.requests
            .lock()
            .map_err(|_| RenderError::Io("request log poisoned".into()))?
            .push(value);
        Ok(self.bytes.clone())
    }
}
