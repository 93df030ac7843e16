//! Host configuration loaded from an optional TOML file.
//!
//! Every field has a default, so an empty file (or no file) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reload::{ReloadConfig, ReloadConfigError};
use serde::Deserialize;
use thiserror::Error;

use crate::gpu::{MAX_RENDER_ORDER, texture_format_for};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ReloadConfigError),
    #[error("bytes per pixel {0} cannot be uploaded as a texture; use 1, 2 or 4")]
    UnrenderablePacking(u8),
    #[error("order {order} gives a texture too large to render; the limit is order {max}")]
    OrderNotRenderable { order: u8, max: u8 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "shader_host".to_string(),
            width: 960,
            height: 540,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReloadSection {
    pub debounce_ms: u64,
    pub order: Option<u8>,
    pub min_order: u8,
    pub bytes_per_pixel: u8,
    pub entropy_tolerance: f64,
    pub source_extensions: Vec<String>,
    pub brick_dir: Option<PathBuf>,
    pub event_queue_capacity: usize,
    pub swap_queue_capacity: usize,
    pub startup_retry_limit: u32,
    pub startup_attempt_timeout_ms: u64,
}

impl Default for ReloadSection {
    fn default() -> Self {
        let defaults = ReloadConfig::default();
        Self {
            debounce_ms: defaults.debounce.as_millis() as u64,
            order: defaults.order,
            min_order: defaults.min_order,
            bytes_per_pixel: defaults.bytes_per_pixel,
            entropy_tolerance: defaults.entropy_tolerance,
            source_extensions: defaults.source_extensions,
            brick_dir: defaults.brick_dir,
            event_queue_capacity: defaults.event_queue_capacity,
            swap_queue_capacity: defaults.swap_queue_capacity,
            startup_retry_limit: defaults.startup_retry_limit,
            startup_attempt_timeout_ms: defaults.startup_attempt_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Program loaded by `run` when no entry is given on the command line.
    pub entry: PathBuf,
    /// When set, the reload status is mirrored here as JSON.
    pub status_file: Option<PathBuf>,
    pub window: WindowConfig,
    pub reload: ReloadSection,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            entry: PathBuf::from("shaders/main.wgsl"),
            status_file: None,
            window: WindowConfig::default(),
            reload: ReloadSection::default(),
        }
    }
}

impl HostConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_reload_config(&self) -> ReloadConfig {
        let section = &self.reload;
        ReloadConfig {
            debounce: Duration::from_millis(section.debounce_ms),
            order: section.order,
            min_order: section.min_order,
            bytes_per_pixel: section.bytes_per_pixel,
            entropy_tolerance: section.entropy_tolerance,
            source_extensions: section.source_extensions.clone(),
            brick_dir: section.brick_dir.clone(),
            event_queue_capacity: section.event_queue_capacity,
            swap_queue_capacity: section.swap_queue_capacity,
            startup_retry_limit: section.startup_retry_limit,
            startup_attempt_timeout: Duration::from_millis(section.startup_attempt_timeout_ms),
        }
    }

    /// Reload settings checked for `run`, which also needs a texture-compatible packing.
    pub fn runtime_reload_config(&self) -> Result<ReloadConfig, ConfigError> {
        let config = self.to_reload_config();
        config.validate()?;
        if texture_format_for(config.bytes_per_pixel).is_none() {
            return Err(ConfigError::UnrenderablePacking(config.bytes_per_pixel));
        }
        for order in config.order.into_iter().chain([config.min_order]) {
            if order > MAX_RENDER_ORDER {
                return Err(ConfigError::OrderNotRenderable {
                    order,
                    max: MAX_RENDER_ORDER,
                });
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = HostConfig::parse("").expect("parse");
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.to_reload_config(), ReloadConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = HostConfig::parse(
            r#"
            log_filter = "reload=debug"
            entry = "demo/plasma.wgsl"

            [window]
            title = "plasma"

            [reload]
            debounce_ms = 200
            order = 6
            bytes_per_pixel = 1
            brick_dir = "bricks"
            "#,
        )
        .expect("parse");
        assert_eq!(config.window.title, "plasma");
        assert_eq!(config.window.width, 960);

        let reload = config.runtime_reload_config().expect("valid");
        assert_eq!(reload.debounce, Duration::from_millis(200));
        assert_eq!(reload.order, Some(6));
        assert_eq!(reload.bytes_per_pixel, 1);
        assert_eq!(reload.brick_dir, Some(PathBuf::from("bricks")));
        assert_eq!(reload.startup_retry_limit, 5);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(HostConfig::parse("[reload]\ndebounce = 5\n").is_err());
    }

    #[test]
    fn run_requires_a_texture_packing() {
        let config = HostConfig::parse("[reload]\nbytes_per_pixel = 3\n").expect("parse");
        assert!(config.to_reload_config().validate().is_ok());
        assert!(matches!(
            config.runtime_reload_config(),
            Err(ConfigError::UnrenderablePacking(3))
        ));

        let config = HostConfig::parse("[reload]\norder = 40\n").expect("parse");
        assert!(matches!(
            config.runtime_reload_config(),
            Err(ConfigError::Invalid(ReloadConfigError::OrderOutOfRange(40)))
        ));
    }

    #[test]
    fn run_rejects_orders_beyond_the_texture_limit() {
        let config = HostConfig::parse("[reload]\norder = 16\n").expect("parse");
        assert!(config.to_reload_config().validate().is_ok());
        assert!(matches!(
            config.runtime_reload_config(),
            Err(ConfigError::OrderNotRenderable { order: 16, max: 13 })
        ));

        let config = HostConfig::parse("[reload]\nmin_order = 14\n").expect("parse");
        assert!(matches!(
            config.runtime_reload_config(),
            Err(ConfigError::OrderNotRenderable { order: 14, .. })
        ));

        let config = HostConfig::parse("[reload]\norder = 13\n").expect("parse");
        assert_eq!(config.runtime_reload_config().expect("renderable").order, Some(13));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let directory = tempfile::tempdir().expect("tempdir");
        let missing = directory.path().join("host.toml");
        assert!(matches!(
            HostConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
        assert_eq!(HostConfig::load(None).expect("defaults"), HostConfig::default());
    }
}
