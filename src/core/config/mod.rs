use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9876;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Which execution backend drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Invoke the engine binary as a child process.
    Local,
    /// Submit jobs to the proxy service over HTTP.
    #[default]
    Remote,
}

/// Client settings stored in `~/.geoengine/client.toml`.
///
/// Every field is optional; CLI flags override file values, and missing
/// values fall back to the defaults above. The client never searches for the
/// engine binary itself; `binary` must point at it explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientSettings {
    pub backend: Option<BackendKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub binary: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
}

impl ClientSettings {
    /// Load settings from the default location, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self> {
        match Self::settings_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load settings from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: ClientSettings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(settings)
    }

    /// Default settings file location.
    pub fn settings_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".geoengine").join("client.toml"))
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }
}
