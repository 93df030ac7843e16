use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use reload_protocol::{SwapRequest, WatchEvent};
use rtrb::{Consumer, Producer, RingBuffer};
use thiserror::Error;

use crate::compiler::{ProgramCompiler, TextureUploader};
use crate::config::{ReloadConfig, ReloadConfigError, canonical_location};
use crate::coordinator::ReloadCoordinator;
use crate::error::StartupError;
use crate::status::StatusBoard;
use crate::watcher::{WatchHandle, watch_paths};

const IDLE_WAIT: Duration = Duration::from_millis(50);
const BLOCKED_SWAP_RETRY: Duration = Duration::from_millis(2);

#[derive(Debug, Error)]
pub enum ReloadStartError {
    #[error(transparent)]
    Config(#[from] ReloadConfigError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to watch files: {0}")]
    Watch(#[from] notify::Error),
    #[error("failed to prepare watched path {path}: {source}")]
    WatchDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn reload thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Render-loop end of the swap ring.
pub struct SwapReceiver<Program, Texture> {
    consumer: Consumer<SwapRequest<Program, Texture>>,
}

impl<Program, Texture> SwapReceiver<Program, Texture> {
    pub fn pop(&mut self) -> Option<SwapRequest<Program, Texture>> {
        self.consumer.pop().ok()
    }

    /// Drain the ring and keep only the newest request.
    pub fn drain_latest(&mut self) -> Option<SwapRequest<Program, Texture>> {
        let mut latest = None;
        while let Some(request) = self.pop() {
            latest = Some(match latest {
                Some(current) => SwapRequest::merge_mailbox(current, request),
                None => request,
            });
        }
        latest
    }

    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }
}

pub struct ReloadChannels<Program, Texture> {
    pub event_sender: Sender<WatchEvent>,
    pub event_receiver: Receiver<WatchEvent>,
    pub swap_producer: Producer<SwapRequest<Program, Texture>>,
    pub swap_receiver: SwapReceiver<Program, Texture>,
}

pub fn create_reload_channels<Program, Texture>(
    config: &ReloadConfig,
) -> Result<ReloadChannels<Program, Texture>, ReloadConfigError> {
    config.validate()?;
    let (event_sender, event_receiver) = bounded(config.event_queue_capacity);
    let (swap_producer, consumer) = RingBuffer::new(config.swap_queue_capacity);
    Ok(ReloadChannels {
        event_sender,
        event_receiver,
        swap_producer,
        swap_receiver: SwapReceiver { consumer },
    })
}

pub struct ReloadStart<Program, Texture> {
    pub runtime: ReloadRuntime,
    pub initial: SwapRequest<Program, Texture>,
    pub swaps: SwapReceiver<Program, Texture>,
}

/// Owns the coordinator thread and the file watcher feeding it.
pub struct ReloadRuntime {
    stop_requested: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
    event_sender: Sender<WatchEvent>,
    watch: Option<WatchHandle>,
}

impl ReloadRuntime {
    /// Watch `entry`, load it synchronously, then keep reloading it on a background thread.
    ///
    /// The entry and brick directories are created if missing and resolved to absolute paths,
    /// which is how the watcher reports them.
    pub fn start<Compiler, Uploader>(
        mut config: ReloadConfig,
        compiler: Compiler,
        uploader: Uploader,
        entry: &Path,
        status: StatusBoard,
    ) -> Result<ReloadStart<Compiler::Program, Uploader::Texture>, ReloadStartError>
    where
        Compiler: ProgramCompiler + Send + 'static,
        Uploader: TextureUploader + Send + 'static,
        Compiler::Program: Send + 'static,
        Uploader::Texture: Send + 'static,
    {
        config.validate()?;
        if let Some(brick_dir) = config.brick_dir.take() {
            config.brick_dir = Some(resolve_directory(&brick_dir)?);
        }
        resolve_directory(&parent_or_current(entry))?;
        let resolved_entry =
            canonical_location(entry).map_err(|source| ReloadStartError::WatchDirectory {
                path: entry.to_path_buf(),
                source,
            })?;
        let entry = resolved_entry.as_path();

        let channels = create_reload_channels(&config)?;
        let directories = watch_directories(&config, entry);
        let watch = watch_paths(&directories, channels.event_sender.clone())?;

        let mut coordinator = ReloadCoordinator::new(
            config,
            compiler,
            uploader,
            channels.event_receiver,
            channels.swap_producer,
            status,
        )?;
        coordinator.track(entry);
        let initial = coordinator.load_initial(entry)?;

        let mut runtime = Self::spawn(coordinator, channels.event_sender)?;
        runtime.watch = Some(watch);
        Ok(ReloadStart {
            runtime,
            initial,
            swaps: channels.swap_receiver,
        })
    }

    /// Run an already configured coordinator on a named thread.
    pub fn spawn<Compiler, Uploader>(
        coordinator: ReloadCoordinator<Compiler, Uploader>,
        event_sender: Sender<WatchEvent>,
    ) -> Result<Self, ReloadStartError>
    where
        Compiler: ProgramCompiler + Send + 'static,
        Uploader: TextureUploader + Send + 'static,
        Compiler::Program: Send + 'static,
        Uploader::Texture: Send + 'static,
    {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let worker_stop_requested = Arc::clone(&stop_requested);
        let join_handle = std::thread::Builder::new()
            .name("reload_coordinator".to_owned())
            .spawn(move || reload_loop(coordinator, worker_stop_requested))
            .map_err(ReloadStartError::Spawn)?;

        Ok(Self {
            stop_requested,
            join_handle: Some(join_handle),
            event_sender,
            watch: None,
        })
    }

    /// Inject an event as if the watcher had reported it.
    pub fn event_sender(&self) -> Sender<WatchEvent> {
        self.event_sender.clone()
    }

    pub fn watched_directories(&self) -> &[PathBuf] {
        self.watch
            .as_ref()
            .map(WatchHandle::directories)
            .unwrap_or(&[])
    }
}

impl Drop for ReloadRuntime {
    fn drop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        self.watch.take();
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                tracing::error!(target: "reload::runtime", "reload thread panicked");
            }
        }
    }
}

fn parent_or_current(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn resolve_directory(directory: &Path) -> Result<PathBuf, ReloadStartError> {
    let wrap = |source| ReloadStartError::WatchDirectory {
        path: directory.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(directory).map_err(wrap)?;
    directory.canonicalize().map_err(wrap)
}

fn watch_directories(config: &ReloadConfig, entry: &Path) -> Vec<PathBuf> {
    let mut directories = vec![parent_or_current(entry)];
    if let Some(brick_dir) = &config.brick_dir {
        if !directories.contains(brick_dir) {
            directories.push(brick_dir.clone());
        }
    }
    directories
}

fn reload_loop<Compiler, Uploader>(
    mut coordinator: ReloadCoordinator<Compiler, Uploader>,
    stop_requested: Arc<AtomicBool>,
) where
    Compiler: ProgramCompiler,
    Uploader: TextureUploader,
{
    tracing::debug!(target: "reload::runtime", "reload thread started");
    while !stop_requested.load(Ordering::Acquire) {
        let now = Instant::now();
        let mut deadline = now + IDLE_WAIT;
        if let Some(next) = coordinator.next_deadline() {
            deadline = deadline.min(next);
        }
        if coordinator.has_blocked_swap() {
            deadline = deadline.min(now + BLOCKED_SWAP_RETRY);
        }

        coordinator.wait_for_event(Some(deadline));
        if coordinator.events_closed() {
            break;
        }
        coordinator.poll(Instant::now());
    }
    tracing::debug!(target: "reload::runtime", "reload thread stopped");
}
