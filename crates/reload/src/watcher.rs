//! File-system notifications turned into [`WatchEvent`]s.

use std::path::PathBuf;

use crossbeam_channel::{Sender, TrySendError};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use reload_protocol::WatchEvent;

/// Keeps the underlying watcher alive; dropping it stops notifications.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    directories: Vec<PathBuf>,
}

impl WatchHandle {
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WatchHandle")
            .field("directories", &self.directories)
            .finish_non_exhaustive()
    }
}

/// Watch each directory (non-recursively) and forward create and modify events.
pub fn watch_paths(
    directories: &[PathBuf],
    sender: Sender<WatchEvent>,
) -> Result<WatchHandle, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    match sender.try_send(WatchEvent::now(path)) {
                        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                        Err(TrySendError::Full(dropped)) => tracing::trace!(
                            target: "reload::watcher",
                            path = %dropped.path.display(),
                            "event queue full; dropping notification"
                        ),
                    }
                }
            }
            Err(error) => tracing::warn!(
                target: "reload::watcher",
                %error,
                "file watcher error"
            ),
        },
        Config::default(),
    )?;

    let mut watched = Vec::new();
    for directory in directories {
        if watched.contains(directory) {
            continue;
        }
        watcher.watch(directory, RecursiveMode::NonRecursive)?;
        tracing::debug!(
            target: "reload::watcher",
            directory = %directory.display(),
            "watching"
        );
        watched.push(directory.clone());
    }
    Ok(WatchHandle {
        _watcher: watcher,
        directories: watched,
    })
}
