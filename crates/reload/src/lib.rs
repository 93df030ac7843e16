//! Watch, fold, load and hand off programs for hot reload.
//!
//! The [`coordinator::ReloadCoordinator`] is an explicit state machine driven by watch events
//! and debounce deadlines. [`runtime::ReloadRuntime`] runs it on its own thread and connects
//! it to a file-system watcher and to the render loop's swap ring.

pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod runtime;
pub mod status;
pub mod watcher;

pub use compiler::{CompileError, ProgramCompiler, TextureUploader, UploadError};
pub use config::{ReloadConfig, ReloadConfigError};
pub use coordinator::{ReloadCoordinator, ReloadState};
pub use debounce::Debouncer;
pub use error::{ReloadError, ReloadFailure, StartupError};
pub use runtime::{
    ReloadChannels, ReloadRuntime, ReloadStart, ReloadStartError, SwapReceiver,
    create_reload_channels,
};
pub use status::StatusBoard;
pub use watcher::{WatchHandle, watch_paths};
