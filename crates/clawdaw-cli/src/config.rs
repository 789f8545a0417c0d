//! Engine configuration.
//!
//! Settings come from `$CONFIG_DIR/clawdaw/config.json`, then environment
//! overrides, then command-line flags. A missing file means defaults; a
//! malformed one is an error naming the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`EngineConfig::soundfont_path`].
pub const ENV_SOUNDFONT: &str = "CLAWDAW_SOUNDFONT";
/// Environment variable overriding [`EngineConfig::renderer`], as a
/// whitespace-separated command line.
pub const ENV_RENDERER: &str = "CLAWDAW_RENDERER";
/// Environment variable overriding [`EngineConfig::render_timeout_secs`].
pub const ENV_RENDER_TIMEOUT: &str = "CLAWDAW_RENDER_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

/// External renderer command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl RendererConfig {
    /// Splits a command line on whitespace. `None` when it is blank.
    pub fn parse_command_line(text: &str) -> Option<RendererConfig> {
        let mut parts = text.split_whitespace().map(str::to_string);
        let executable = parts.next()?;
        Some(RendererConfig {
            executable,
            args: parts.collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub soundfont_path: Option<PathBuf>,
    pub renderer: Option<RendererConfig>,
    pub render_timeout_secs: u64,
    pub strict: bool,
    pub out_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            soundfont_path: None,
            renderer: None,
            render_timeout_secs: 300,
            strict: false,
            out_dir: PathBuf::from("out"),
        }
    }
}

impl EngineConfig {
    /// `$CONFIG_DIR/clawdaw/config.json`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("clawdaw").join("config.json"))
    }

    /// Loads the default config file, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Reads `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides looked up through `get`.
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = get(ENV_SOUNDFONT).filter(|v| !v.trim().is_empty()) {
            self.soundfont_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(line) = get(ENV_RENDERER) {
            if let Some(renderer) = RendererConfig::parse_command_line(&line) {
                self.renderer = Some(renderer);
            }
        }
        if let Some(value) = get(ENV_RENDER_TIMEOUT) {
            self.render_timeout_secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidEnv {
                    var: ENV_RENDER_TIMEOUT,
                    value,
                })?;
        }
        Ok(())
    }
}
