use std::path::PathBuf;

use brick::{BrickParseError, BrickWriteError, DecodeError, EncodeError, ValidationError};
use reload_protocol::ReloadStage;
use thiserror::Error;

use crate::compiler::{CompileError, UploadError};

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] BrickParseError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("folded brick failed its self-check: {0}")]
    SelfCheck(String),
    #[error(transparent)]
    Write(#[from] BrickWriteError),
    #[error(transparent)]
    Validate(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("render loop is gone")]
    SwapQueueClosed,
}

/// One failed reload attempt. Never fatal on its own.
#[derive(Debug, Error)]
#[error("{stage} failed for {path}: {error}")]
pub struct ReloadFailure {
    pub stage: ReloadStage,
    pub path: PathBuf,
    #[source]
    pub error: ReloadError,
}

impl ReloadFailure {
    pub fn new(stage: ReloadStage, path: impl Into<PathBuf>, error: impl Into<ReloadError>) -> Self {
        Self {
            stage,
            path: path.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no program loaded after {attempts} attempts; last failure: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: ReloadFailure,
    },
    #[error("{path} is neither a tracked source nor a brick")]
    UnsupportedEntry { path: PathBuf },
    #[error("watch events stopped after {attempts} failed attempts; last failure: {last}")]
    EventsClosed {
        attempts: u32,
        #[source]
        last: ReloadFailure,
    },
}
