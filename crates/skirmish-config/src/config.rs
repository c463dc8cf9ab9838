//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Simulation host settings.
    pub server: ServerConfig,
    /// Entity health defaults.
    pub health: HealthConfig,
    /// Status effect engine settings.
    pub effects: EffectsConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Simulation host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Fixed simulation tick rate (Hz).
    pub tick_rate: u32,
    /// Maximum number of admitted clients (0 = unlimited).
    pub max_players: u32,
    /// Gameplay content file (action and status effect definitions).
    pub content_file: PathBuf,
    /// Length of a headless run in seconds.
    pub simulate_seconds: f64,
}

/// Entity health configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Max health given to spawned players.
    pub default_max_health: f32,
    /// Health values at or below this are treated as zero.
    pub zero_epsilon: f32,
    /// Entities go through `Incapacitated` before `Dead` when they die.
    pub downed_before_death: bool,
}

/// Status effect configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EffectsConfig {
    /// Fire one tick per elapsed retrigger period instead of at most one
    /// tick per update.
    pub catch_up_ticks: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_players: 16,
            content_file: PathBuf::from("content.ron"),
            simulate_seconds: 10.0,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_max_health: 100.0,
            zero_epsilon: 1e-4,
            downed_before_death: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for the server (`<config dir>/skirmish`), or
/// the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("skirmish"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            config.validate()?;
            tracing::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            tracing::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }

    fn read(config_path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Rejects settings the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tick_rate == 0 {
            return Err(ConfigError::invalid("server.tick_rate", "must be at least 1 Hz"));
        }
        let seconds = self.server.simulate_seconds;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ConfigError::invalid(
                "server.simulate_seconds",
                format!("{seconds} is not a non-negative duration"),
            ));
        }
        let max = self.health.default_max_health;
        if !max.is_finite() || max <= 0.0 {
            return Err(ConfigError::invalid(
                "health.default_max_health",
                format!("{max} is not positive"),
            ));
        }
        let epsilon = self.health.zero_epsilon;
        if !epsilon.is_finite() || epsilon < 0.0 || epsilon >= max {
            return Err(ConfigError::invalid(
                "health.zero_epsilon",
                format!("{epsilon} must lie in [0, default_max_health)"),
            ));
        }
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join("config.ron"))?;
        new_config.validate()?;

        if &new_config != self {
            tracing::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Resolves the content file against `config_dir` when it is relative.
    pub fn content_path(&self, config_dir: &Path) -> PathBuf {
        if self.server.content_file.is_absolute() {
            self.server.content_file.clone()
        } else {
            config_dir.join(&self.server.content_file)
        }
    }
}
