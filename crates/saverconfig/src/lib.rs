use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// File name of the settings file inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "shadesaver.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    #[default]
    Waitable,
    Vsync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaverConfig {
    #[serde(default)]
    pub shader: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub hot_reload: bool,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub power: Power,
    #[serde(default)]
    pub fps_overlay: bool,
    #[serde(
        default = "default_stats_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub stats_interval: Duration,
    #[serde(default = "default_wake_threshold")]
    pub wake_threshold: u32,
    #[serde(default)]
    pub window: WindowSettings,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            shader: None,
            hot_reload: true,
            pacing: Pacing::default(),
            power: Power::default(),
            fps_overlay: false,
            stats_interval: default_stats_interval(),
            wake_threshold: default_wake_threshold(),
            window: WindowSettings::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_width() -> u32 {
    900
}

fn default_height() -> u32 {
    600
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_wake_threshold() -> u32 {
    4
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer).map(|d| d.unwrap_or(default_stats_interval()))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl SaverConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SaverConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates the settings file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Like [`SaverConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.stats_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "stats_interval must be greater than zero".into(),
            ));
        }

        if let Some(shader) = &self.shader {
            if shader.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("shader path may not be empty".into()));
            }
        }

        Ok(())
    }
}
