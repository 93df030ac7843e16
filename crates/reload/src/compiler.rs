//! Capabilities the coordinator needs from the graphics backend.

use brick::Brick;
use thiserror::Error;

/// Compiler diagnostic, carried as text so the backend's error type stays private.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UploadError {
    pub message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait ProgramCompiler {
    type Program;

    /// May block for a long time. Called only from the coordinator thread.
    fn compile(&mut self, source: &str) -> Result<Self::Program, CompileError>;
}

pub trait TextureUploader {
    type Texture;

    fn upload(&mut self, brick: &Brick) -> Result<Self::Texture, UploadError>;
}
