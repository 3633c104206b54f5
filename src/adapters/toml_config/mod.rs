// TOML config adapter - Queue configuration from file, environment and defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::scheduler::SchedulerConfig;
use crate::domain::model::InterpolationFactor;
use crate::domain::rules::{parse_rate, ProbeDefaults};
use crate::error::{SmoothframeError, SmoothframeResult};

/// File picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "smoothframe.toml";

/// Prefix of environment overrides, e.g. `SMOOTHFRAME_DEFAULT_FACTOR`
pub const ENV_PREFIX: &str = "SMOOTHFRAME_";

/// Longest accepted dispatch debounce
pub const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Settings for the queue, its engine and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Trailing debounce of the dispatch check, in milliseconds
    pub dispatch_debounce_ms: u64,
    /// Factor used when none is given on the command line
    pub default_factor: u32,
    /// Engine binary
    pub ffmpeg_path: PathBuf,
    /// Prober fallback for an absent duration, in seconds
    pub default_duration: f64,
    /// Prober fallback for an absent frame rate; ratios such as `30000/1001` are allowed
    pub default_frame_rate: String,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dispatch_debounce_ms: 100,
            default_factor: InterpolationFactor::MIN,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            default_duration: 0.0,
            default_frame_rate: "30".to_string(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    smoothframe: QueueConfig,
}

impl QueueConfig {
    /// Defaults, overlaid by the file (explicit or `smoothframe.toml`), overlaid by the environment
    pub fn resolve(path: Option<&Path>) -> SmoothframeResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read the `[smoothframe]` table of a TOML file
    pub fn load(path: &Path) -> SmoothframeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SmoothframeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, path)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(text: &str, path: &Path) -> SmoothframeResult<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|source| SmoothframeError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(file.smoothframe)
    }

    /// Apply `SMOOTHFRAME_*` overrides looked up through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> SmoothframeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(&format!("{}{}", ENV_PREFIX, key.to_uppercase()));

        if let Some(value) = var("dispatch_debounce_ms") {
            self.dispatch_debounce_ms = parse_env("dispatch_debounce_ms", &value)?;
        }
        if let Some(value) = var("default_factor") {
            self.default_factor = parse_env("default_factor", &value)?;
        }
        if let Some(value) = var("ffmpeg_path") {
            self.ffmpeg_path = PathBuf::from(value);
        }
        if let Some(value) = var("default_duration") {
            self.default_duration = parse_env("default_duration", &value)?;
        }
        if let Some(value) = var("default_frame_rate") {
            self.default_frame_rate = value;
        }
        if let Some(value) = var("log_level") {
            self.log_level = value;
        }
        if let Some(value) = var("log_json") {
            self.log_json = parse_env("log_json", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> SmoothframeResult<()> {
        if self.dispatch_debounce_ms > MAX_DEBOUNCE_MS {
            return Err(invalid(
                "dispatch_debounce_ms",
                format!("must not exceed {} ms", MAX_DEBOUNCE_MS),
            ));
        }
        self.factor()?;
        self.probe_defaults()?;
        if self.log_level.trim().is_empty() {
            return Err(invalid("log_level", "must not be empty"));
        }
        Ok(())
    }

    pub fn dispatch_debounce(&self) -> Duration {
        Duration::from_millis(self.dispatch_debounce_ms)
    }

    pub fn factor(&self) -> SmoothframeResult<InterpolationFactor> {
        InterpolationFactor::new(self.default_factor)
            .map_err(|e| invalid("default_factor", e.to_string()))
    }

    pub fn probe_defaults(&self) -> SmoothframeResult<ProbeDefaults> {
        let frame_rate = parse_rate(&self.default_frame_rate)
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| {
                invalid(
                    "default_frame_rate",
                    format!("{:?} is not a positive rate", self.default_frame_rate),
                )
            })?;
        if !self.default_duration.is_finite() || self.default_duration < 0.0 {
            return Err(invalid("default_duration", "must be a non-negative number"));
        }
        Ok(ProbeDefaults {
            duration: self.default_duration,
            frame_rate,
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            dispatch_debounce: self.dispatch_debounce(),
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> SmoothframeError {
    SmoothframeError::InvalidConfig {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_env<T>(key: &str, value: &str) -> SmoothframeResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, format!("{:?}: {}", value, e)))
}
