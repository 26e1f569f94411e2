use std::path::{Path, PathBuf};

use chronosta_era::{EraError, EraRegistry};
use chronosta_input::KeyBindings;
use chronosta_time::{ClockConfig, TimeConfig, TimelineConfig};
use serde::{Deserialize, Serialize};

/// Errors from loading or checking a [`GameConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0}")]
    UnknownFormat(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Eras(#[from] EraError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraConfig {
    /// Minimum ticks between two era switches; 0 disables the cooldown.
    pub switch_cooldown_ticks: u64,
    /// YAML era definitions replacing the built-in ones.
    pub definitions: Option<PathBuf>,
}

impl Default for EraConfig {
    fn default() -> Self {
        Self {
            switch_cooldown_ticks: 30,
            definitions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub dir: PathBuf,
    /// Numbered quick and manual slots each.
    pub max_slots: u8,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("saves"),
            max_slots: 3,
        }
    }
}

/// Every tunable of a session. Missing sections and fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub clock: ClockConfig,
    pub timeline: TimelineConfig,
    pub time: TimeConfig,
    pub eras: EraConfig,
    pub saves: SaveConfig,
    pub bindings: KeyBindings,
}

impl GameConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&src)?,
            Some("json") => Self::from_json(&src)?,
            other => {
                return Err(ConfigError::UnknownFormat(
                    other.unwrap_or("<none>").to_string(),
                ));
            }
        };
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_yaml(src: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(src: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.clock.tick_rate_hz == 0 {
            return invalid("clock.tick_rate_hz must be positive");
        }
        if self.clock.max_steps_per_advance == 0 {
            return invalid("clock.max_steps_per_advance must be positive");
        }
        if self.timeline.capacity < 2 {
            return invalid("timeline.capacity must hold at least two snapshots");
        }
        let factor = self.time.slow_motion_factor;
        if !(factor > 0.0 && factor < 1.0) {
            return invalid("time.slow_motion_factor must lie in (0, 1)");
        }
        if self.time.slow_motion_limit_secs < 0.0 || self.time.slow_motion_cooldown_secs < 0.0 {
            return invalid("slow motion limit and cooldown cannot be negative");
        }
        if self.time.rewind_rate == 0 {
            return invalid("time.rewind_rate must be positive");
        }
        Ok(())
    }

    /// Era registry from the configured definitions file, or the built-ins.
    pub fn era_registry(&self) -> Result<EraRegistry, ConfigError> {
        match &self.eras.definitions {
            Some(path) => Ok(EraRegistry::load(path)?),
            None => Ok(EraRegistry::builtin()),
        }
    }

    /// Tick length in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.clock.tick_rate_hz.max(1) as f32
    }
}
