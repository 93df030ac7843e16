//! GPU host for hot-reloaded brick programs.
//!
//! The library half holds the wgpu backends for the reload coordinator, the frame loop that
//! swaps programs between frames, host configuration and the offline brick commands. The
//! binary wires them to a winit window and the CLI.

pub mod cli;
pub mod commands;
pub mod config;
pub mod gpu;
pub mod host;
pub mod renderer;
pub mod wgsl;

pub use config::{ConfigError, HostConfig};
pub use gpu::{BrickTexture, BrickTextureUploader, FrameUniform, ProgramLayout, WgslCompiler};
pub use renderer::{GpuContext, GpuInitError, Renderer};
