//! Glue between the reload status board and the window the user watches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use reload::{ReloadConfig, StatusBoard};
use reload_protocol::{ReloadKind, ReloadStatus};

use crate::wgsl::DEFAULT_PROGRAM;

/// Make sure `entry` can be loaded, writing the bundled program if a source entry is missing.
pub fn ensure_entry(entry: &Path, config: &ReloadConfig) -> Result<()> {
    match config.kind_of(entry) {
        None => bail!(
            "{} is neither a brick nor a source with extension {:?}",
            entry.display(),
            config.source_extensions
        ),
        Some(_) if entry.exists() => Ok(()),
        Some(ReloadKind::Brick) => bail!("brick {} does not exist", entry.display()),
        Some(ReloadKind::Source) => {
            if let Some(parent) = entry.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            std::fs::write(entry, DEFAULT_PROGRAM)
                .with_context(|| format!("write default program to {}", entry.display()))?;
            tracing::info!(
                target: "shader_host::host",
                path = %entry.display(),
                "wrote default program"
            );
            Ok(())
        }
    }
}

/// Mirrors status board changes into the window title and an optional JSON file.
pub struct StatusMirror {
    board: StatusBoard,
    base_title: String,
    status_file: Option<PathBuf>,
    last_seen: Option<Arc<ReloadStatus>>,
}

impl StatusMirror {
    pub fn new(board: StatusBoard, base_title: String, status_file: Option<PathBuf>) -> Self {
        Self {
            board,
            base_title,
            status_file,
            last_seen: None,
        }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// New window title when the status changed since the last call.
    pub fn refresh(&mut self) -> Option<String> {
        let snapshot = self.board.snapshot();
        if self
            .last_seen
            .as_ref()
            .is_some_and(|seen| Arc::ptr_eq(seen, &snapshot))
        {
            return None;
        }
        if let Some(path) = &self.status_file {
            if let Err(error) = write_status_file(path, &snapshot) {
                tracing::warn!(target: "shader_host::host", error = %format!("{error:#}"), "status file not written");
            }
        }
        let title = format!("{} | {}", self.base_title, snapshot.headline());
        self.last_seen = Some(snapshot);
        Some(title)
    }
}

fn write_status_file(path: &Path, status: &ReloadStatus) -> Result<()> {
    let json = serde_json::to_vec_pretty(status).context("serialize status")?;
    brick::storage::write_bytes_atomic(path, &json)?;
    Ok(())
}
