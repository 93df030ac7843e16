use std::path::{Path, PathBuf};
use std::time::Duration;

use brick::{BRICK_EXTENSION, MAX_BYTES_PER_PIXEL, MAX_ORDER, brick_path_for};
use reload_protocol::ReloadKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct ReloadConfig {
    /// Quiet period after the last event for a path before it is processed.
    pub debounce: Duration,
    /// Fixed grid order for folded sources. `None` picks the smallest order that fits.
    pub order: Option<u8>,
    pub min_order: u8,
    pub bytes_per_pixel: u8,
    pub entropy_tolerance: f64,
    pub source_extensions: Vec<String>,
    /// Where folded bricks are written. `None` writes next to the source.
    pub brick_dir: Option<PathBuf>,
    pub event_queue_capacity: usize,
    pub swap_queue_capacity: usize,
    pub startup_retry_limit: u32,
    /// How long startup waits for a fix before counting another failed attempt.
    pub startup_attempt_timeout: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(75),
            order: None,
            min_order: 4,
            bytes_per_pixel: 4,
            entropy_tolerance: brick::DEFAULT_ENTROPY_TOLERANCE,
            source_extensions: vec!["wgsl".to_string()],
            brick_dir: None,
            event_queue_capacity: 256,
            swap_queue_capacity: 4,
            startup_retry_limit: 5,
            startup_attempt_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReloadConfigError {
    #[error("order {0} exceeds the maximum of {max}", max = MAX_ORDER)]
    OrderOutOfRange(u8),
    #[error("bytes per pixel must be within 1..={max}, got {0}", max = MAX_BYTES_PER_PIXEL)]
    BytesPerPixelOutOfRange(u8),
    #[error("entropy tolerance must be finite and non-negative, got {0}")]
    EntropyToleranceInvalid(f64),
    #[error("{queue} queue capacity must be non-zero")]
    ZeroCapacity { queue: &'static str },
    #[error("startup retry limit must be at least 1")]
    StartupRetryLimitZero,
    #[error("no source extensions configured")]
    NoSourceExtensions,
    #[error("source extension `brick` collides with brick files")]
    SourceExtensionIsBrick,
}

impl ReloadConfig {
    pub fn validate(&self) -> Result<(), ReloadConfigError> {
        for order in self.order.iter().chain(std::iter::once(&self.min_order)) {
            if *order > MAX_ORDER {
                return Err(ReloadConfigError::OrderOutOfRange(*order));
            }
        }
        if self.bytes_per_pixel == 0 || self.bytes_per_pixel > MAX_BYTES_PER_PIXEL {
            return Err(ReloadConfigError::BytesPerPixelOutOfRange(
                self.bytes_per_pixel,
            ));
        }
        if !self.entropy_tolerance.is_finite() || self.entropy_tolerance < 0.0 {
            return Err(ReloadConfigError::EntropyToleranceInvalid(
                self.entropy_tolerance,
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(ReloadConfigError::ZeroCapacity { queue: "event" });
        }
        if self.swap_queue_capacity == 0 {
            return Err(ReloadConfigError::ZeroCapacity { queue: "swap" });
        }
        if self.startup_retry_limit == 0 {
            return Err(ReloadConfigError::StartupRetryLimitZero);
        }
        if self.source_extensions.is_empty() {
            return Err(ReloadConfigError::NoSourceExtensions);
        }
        if self
            .source_extensions
            .iter()
            .any(|extension| extension == BRICK_EXTENSION)
        {
            return Err(ReloadConfigError::SourceExtensionIsBrick);
        }
        Ok(())
    }

    pub fn kind_of(&self, path: &Path) -> Option<ReloadKind> {
        let extension = path.extension()?.to_str()?;
        if extension == BRICK_EXTENSION {
            return Some(ReloadKind::Brick);
        }
        self.source_extensions
            .iter()
            .any(|candidate| candidate == extension)
            .then_some(ReloadKind::Source)
    }

    pub fn brick_path_for(&self, source: &Path) -> PathBuf {
        let directory = match &self.brick_dir {
            Some(directory) => directory.as_path(),
            None => source.parent().unwrap_or(Path::new(".")),
        };
        brick_path_for(source, directory)
    }
}

/// `path` with its directory canonicalized. The file itself does not have to exist yet.
pub fn canonical_location(path: &Path) -> std::io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} does not name a file", path.display()),
        )
    })?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(directory.canonicalize()?.join(file_name))
}
