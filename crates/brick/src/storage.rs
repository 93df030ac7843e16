//! Brick files on disk.
//!
//! Writes go to a temporary file in the destination directory and are renamed over the
//! target, so a concurrent reader sees either the old brick or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::format::{BRICK_EXTENSION, Brick, BrickParseError};

#[derive(Debug, Error)]
pub enum BrickReadError {
    #[error("failed to read brick {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse brick {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: BrickParseError,
    },
}

#[derive(Debug, Error)]
#[error("failed to write brick {path}: {source}")]
pub struct BrickWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// SHA-256 of a serialized brick file.
pub type BrickDigest = [u8; 32];

pub fn content_digest(bytes: &[u8]) -> BrickDigest {
    Sha256::digest(bytes).into()
}

pub fn read_brick(path: &Path) -> Result<Brick, BrickReadError> {
    let bytes = std::fs::read(path).map_err(|source| BrickReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Brick::from_bytes(&bytes).map_err(|source| BrickReadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically replace `path` with the serialized brick. Returns the bytes written.
pub fn write_brick_atomic(path: &Path, brick: &Brick) -> Result<Vec<u8>, BrickWriteError> {
    let bytes = brick.to_bytes();
    write_bytes_atomic(path, &bytes)?;
    tracing::debug!(
        target: "brick::storage",
        path = %path.display(),
        len = bytes.len(),
        "brick replaced"
    );
    Ok(bytes)
}

pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), BrickWriteError> {
    let wrap = |source| BrickWriteError {
        path: path.to_path_buf(),
        source,
    };
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(wrap)?;

    let mut staging = NamedTempFile::new_in(directory).map_err(wrap)?;
    staging.write_all(bytes).map_err(wrap)?;
    staging.as_file().sync_all().map_err(wrap)?;
    staging.persist(path).map_err(|error| wrap(error.error))?;
    Ok(())
}

/// `<brick_dir>/<stem>.brick` for a source file.
pub fn brick_path_for(source: &Path, brick_dir: &Path) -> PathBuf {
    let mut file_name = source
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| "unnamed".into());
    file_name.push(".");
    file_name.push(BRICK_EXTENSION);
    brick_dir.join(file_name)
}

pub fn is_brick_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension == BRICK_EXTENSION)
}
