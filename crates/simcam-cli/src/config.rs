//! Runtime configuration – reads/writes `~/.simcam/config.toml`.

use serde::{Deserialize, Serialize};
use simcam_types::SimcamError;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted defaults for `simcam run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sensor description used when `--description` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_path: Option<PathBuf>,

    /// Per-topic buffer of the in-process bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Simulation steps per simulated second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Steps to simulate; 0 runs until Ctrl-C.
    #[serde(default = "default_frames")]
    pub frames: u64,
}

fn default_bus_capacity() -> usize {
    16
}
fn default_frame_rate() -> f64 {
    30.0
}
fn default_frames() -> u64 {
    90
}

impl Default for Config {
    fn default() -> Self {
        Self {
            description_path: None,
            bus_capacity: default_bus_capacity(),
            frame_rate: default_frame_rate(),
            frames: default_frames(),
        }
    }
}

/// Return the path to `~/.simcam/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".simcam").join("config.toml")
}

/// Load the config from disk, or defaults when the file does not exist.
/// `SIMCAM_*` overrides are applied either way.
pub fn load() -> Result<Config, SimcamError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SimcamError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SimcamError::Configuration(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| SimcamError::Configuration(format!("failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `SIMCAM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SIMCAM_DESCRIPTION` | `description_path` |
/// | `SIMCAM_BUS_CAPACITY` | `bus_capacity` |
/// | `SIMCAM_FRAME_RATE` | `frame_rate` |
/// | `SIMCAM_FRAMES` | `frames` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SIMCAM_DESCRIPTION") {
        cfg.description_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("SIMCAM_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.bus_capacity = capacity;
    }
    if let Ok(v) = std::env::var("SIMCAM_FRAME_RATE")
        && let Ok(rate) = v.parse::<f64>()
    {
        cfg.frame_rate = rate;
    }
    if let Ok(v) = std::env::var("SIMCAM_FRAMES")
        && let Ok(frames) = v.parse::<u64>()
    {
        cfg.frames = frames;
    }
}

/// Save the config to `~/.simcam/config.toml`.
pub fn save(cfg: &Config) -> Result<PathBuf, SimcamError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), SimcamError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SimcamError::Configuration(format!("failed to create config directory: {e}"))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| SimcamError::Serialization(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        SimcamError::Configuration(format!("failed to write config at {}: {e}", path.display()))
    })
}
