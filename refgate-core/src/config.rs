//! Gateway configuration
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. YAML file: the path given on the command line, otherwise
//!    `<config dir>/refgate/config.yml` when it exists
//! 3. Environment: `FFMPEG_PATH`, `SOURCE_FOLDER`, `OUTPUT_FOLDER`,
//!    `REFGATE_TIMEOUT_SECONDS`
//! 4. Command-line flags (applied by the binary)
//!
//! ```yaml
//! tool_path: /usr/local/bin/ffmpeg
//! source_dir: /tmp/vids/sources
//! output_dir: /tmp/vids/outputs
//! default_extension: .mp4
//! timeout_seconds: 300
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::registry::{normalize_extension, DEFAULT_TARGET_EXTENSION};

pub const ENV_TOOL_PATH: &str = "FFMPEG_PATH";
pub const ENV_SOURCE_DIR: &str = "SOURCE_FOLDER";
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_FOLDER";
pub const ENV_TIMEOUT: &str = "REFGATE_TIMEOUT_SECONDS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Tool binary spawned for every command
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,

    /// Scanned once at startup; every regular file becomes a source reference
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Target files are allocated here
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_extension")]
    pub default_extension: String,

    /// Per-run limit enforced by the executor
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            default_extension: default_extension(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/ffmpeg")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("/tmp/vids/sources")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/vids/outputs")
}

fn default_extension() -> String {
    DEFAULT_TARGET_EXTENSION.to_string()
}

fn default_timeout() -> u64 {
    300
}

impl GatewayConfig {
    /// Load defaults, then the YAML file, then the process environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|path| path.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty file deserializes to unit, not to a map of defaults
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(contents)?)
    }

    /// Apply environment-style overrides; `lookup` returns a value per key
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup(ENV_TOOL_PATH) {
            debug!("{} overrides tool path", ENV_TOOL_PATH);
            self.tool_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_SOURCE_DIR) {
            debug!("{} overrides source directory", ENV_SOURCE_DIR);
            self.source_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_OUTPUT_DIR) {
            debug!("{} overrides output directory", ENV_OUTPUT_DIR);
            self.output_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            self.timeout_seconds = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT} must be a whole number of seconds"))?;
        }
        Ok(())
    }

    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("tool_path", &self.tool_path),
            ("source_dir", &self.source_dir),
            ("output_dir", &self.output_dir),
        ] {
            if path.as_os_str().is_empty() {
                bail!("{name} cannot be empty");
            }
        }

        if self.timeout_seconds == 0 {
            bail!("timeout_seconds must be greater than zero");
        }

        normalize_extension(&self.default_extension)
            .map_err(|e| anyhow::anyhow!("default_extension: {e}"))?;

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// `<platform config dir>/refgate/config.yml`, if a home directory is known
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "refgate")
        .map(|dirs| dirs.config_dir().join("config.yml"))
}
