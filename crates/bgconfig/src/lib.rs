//! TOML configuration for a shader-rendered profile background.
//!
//! ```toml
//! version = 1
//!
//! [background]
//! shader = "shaders/plasma.glsl"
//! cache = true
//! fill_viewport = false
//!
//! [window]
//! width = 1280
//! height = 720
//! fps = 60
//!
//! [reload]
//! watch = true
//! interval = "500ms"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackgroundConfig {
    pub version: u32,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub reload: Reload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Background {
    /// Fragment shader implementing `mainImage`.
    pub shader: Option<PathBuf>,
    /// Share compiled programs through the process-wide program cache.
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// Presentation hint: cover the whole display instead of a window.
    #[serde(default)]
    pub fill_viewport: bool,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            shader: None,
            cache: default_cache(),
            fill_viewport: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub fps: Option<f32>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            fps: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Reload {
    #[serde(default)]
    pub watch: bool,
    #[serde(
        default = "default_reload_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
}

impl Default for Reload {
    fn default() -> Self {
        Self {
            watch: false,
            interval: default_reload_interval(),
        }
    }
}

impl BackgroundConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: BackgroundConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file, resolving a relative shader path against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        if let (Some(shader), Some(parent)) = (config.background.shader.as_mut(), path.parent()) {
            if shader.is_relative() {
                *shader = parent.join(&*shader);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }
        if let Some(shader) = &self.background.shader {
            if shader.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "background.shader must not be empty".into(),
                ));
            }
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero (got {}x{})",
                self.window.width, self.window.height
            )));
        }
        if let Some(fps) = self.window.fps {
            if !(fps > 0.0 && fps.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "window.fps must be positive (got {fps})"
                )));
            }
        }
        // Checked even with `watch` off; `--watch` can enable it.
        if self.reload.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reload.interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            background: Background::default(),
            window: WindowSettings::default(),
            reload: Reload::default(),
        }
    }
}

fn default_cache() -> bool {
    true
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_title() -> String {
    "Profile Background".to_string()
}

fn default_reload_interval() -> Duration {
    Duration::from_millis(500)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}
