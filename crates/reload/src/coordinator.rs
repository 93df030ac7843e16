//! The reload state machine.
//!
//! ```text
//! Idle -> Pending(path) -> Encoding(path) | Decoding(path) -> Compiling(path)
//!      -> Uploading(path) -> Swapping(path) -> Idle
//! any working state -> Failed(path, reason) -> Idle
//! ```
//!
//! Events only restart debounce timers. Work starts when a timer elapses, and before each
//! commit point the inbox is drained; a newer event for the same path abandons the attempt.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use brick::{Brick, BrickDigest, BrickValidator, ValidationReport, content_digest};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use reload_protocol::{
    BrickSummary, ReloadKind, ReloadOutcome, ReloadPhase, ReloadStage, SwapRequest, WatchEvent,
};
use rtrb::{Producer, PushError};

use crate::compiler::{ProgramCompiler, TextureUploader};
use crate::config::{ReloadConfig, ReloadConfigError, canonical_location};
use crate::debounce::{Debouncer, DueReload};
use crate::error::{ReloadError, ReloadFailure, StartupError};
use crate::status::StatusBoard;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Pending(PathBuf),
    Encoding(PathBuf),
    Decoding(PathBuf),
    Compiling(PathBuf),
    Uploading(PathBuf),
    Swapping(PathBuf),
    Failed(PathBuf, String),
}

impl ReloadState {
    pub fn phase(&self) -> ReloadPhase {
        match self {
            ReloadState::Idle => ReloadPhase::Idle,
            ReloadState::Pending(_) => ReloadPhase::Pending,
            ReloadState::Encoding(_) => ReloadPhase::Encoding,
            ReloadState::Decoding(_) => ReloadPhase::Decoding,
            ReloadState::Compiling(_) => ReloadPhase::Compiling,
            ReloadState::Uploading(_) => ReloadPhase::Uploading,
            ReloadState::Swapping(_) => ReloadPhase::Swapping,
            ReloadState::Failed(_, _) => ReloadPhase::Failed,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ReloadState::Idle => None,
            ReloadState::Pending(path)
            | ReloadState::Encoding(path)
            | ReloadState::Decoding(path)
            | ReloadState::Compiling(path)
            | ReloadState::Uploading(path)
            | ReloadState::Swapping(path)
            | ReloadState::Failed(path, _) => Some(path),
        }
    }
}

/// Result of an attempt that did not fail.
enum Attempt<Ready> {
    Ready(Ready),
    Superseded,
    Unchanged,
}

struct Prepared<Program, Texture> {
    program: Program,
    texture: Texture,
    summary: BrickSummary,
}

pub struct ReloadCoordinator<Compiler, Uploader>
where
    Compiler: ProgramCompiler,
    Uploader: TextureUploader,
{
    config: ReloadConfig,
    validator: BrickValidator,
    compiler: Compiler,
    uploader: Uploader,
    events: Receiver<WatchEvent>,
    swaps: Producer<SwapRequest<Compiler::Program, Uploader::Texture>>,
    status: StatusBoard,
    debouncer: Debouncer,
    state: ReloadState,
    next_generation: u64,
    tracked: HashSet<PathBuf>,
    written_digests: HashMap<PathBuf, BrickDigest>,
    blocked: Option<SwapRequest<Compiler::Program, Uploader::Texture>>,
    events_closed: bool,
}

impl<Compiler, Uploader> ReloadCoordinator<Compiler, Uploader>
where
    Compiler: ProgramCompiler,
    Uploader: TextureUploader,
{
    pub fn new(
        config: ReloadConfig,
        compiler: Compiler,
        uploader: Uploader,
        events: Receiver<WatchEvent>,
        swaps: Producer<SwapRequest<Compiler::Program, Uploader::Texture>>,
        status: StatusBoard,
    ) -> Result<Self, ReloadConfigError> {
        config.validate()?;
        Ok(Self {
            validator: BrickValidator::new(config.entropy_tolerance),
            debouncer: Debouncer::new(config.debounce),
            config,
            compiler,
            uploader,
            events,
            swaps,
            status,
            state: ReloadState::Idle,
            next_generation: 0,
            tracked: HashSet::new(),
            written_digests: HashMap::new(),
            blocked: None,
            events_closed: false,
        })
    }

    pub fn state(&self) -> &ReloadState {
        &self.state
    }

    pub fn config(&self) -> &ReloadConfig {
        &self.config
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn events_closed(&self) -> bool {
        self.events_closed
    }

    /// Restrict reloads to `path` (and, for a source, its brick). With nothing tracked every
    /// source or brick event is accepted.
    pub fn track(&mut self, path: &Path) {
        if self.config.kind_of(path) == Some(ReloadKind::Source) {
            self.tracked.insert(self.config.brick_path_for(path));
        }
        self.tracked.insert(path.to_path_buf());
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    pub fn has_blocked_swap(&self) -> bool {
        self.blocked.is_some()
    }

    pub fn accept(&mut self, event: WatchEvent) {
        let Some(path) = self.tracked_path(event.path) else {
            return;
        };
        let Some(kind) = self.config.kind_of(&path) else {
            return;
        };
        self.next_generation += 1;
        let generation = self.next_generation;
        let replaced = self.debouncer.record(path.clone(), event.timestamp, generation);
        tracing::trace!(
            target: "reload::coordinator",
            path = %path.display(),
            ?kind,
            generation,
            replaced,
            "watch event accepted"
        );
        self.status.record_event();
        if self.state == ReloadState::Idle {
            self.transition(ReloadState::Pending(path));
        }
    }

    /// The tracked spelling of `path`, resolving relative or symlinked directories the way
    /// [`Self::track`] stored them.
    fn tracked_path(&self, path: PathBuf) -> Option<PathBuf> {
        if self.tracked.is_empty() || self.tracked.contains(&path) {
            return Some(path);
        }
        canonical_location(&path)
            .ok()
            .filter(|resolved| self.tracked.contains(resolved))
    }

    /// Move everything waiting in the channel into the debouncer without blocking.
    pub fn drain_inbox(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.accept(event),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.events_closed = true;
                    return;
                }
            }
        }
    }

    /// Block for at most until `deadline` waiting for one event.
    pub fn wait_for_event(&mut self, deadline: Option<Instant>) {
        let received = match deadline {
            Some(deadline) => self
                .events
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => self.events.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(event) => self.accept(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.events_closed = true,
        }
    }

    /// Run every reload whose debounce window has elapsed by `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<ReloadOutcome> {
        self.retry_blocked();
        self.drain_inbox();

        let mut outcomes = Vec::new();
        for DueReload { path, generation } in self.debouncer.take_due(now) {
            outcomes.push(self.run(path, generation));
        }
        let next = match self.debouncer.next_path() {
            Some(path) => ReloadState::Pending(path.to_path_buf()),
            None => ReloadState::Idle,
        };
        self.transition(next);
        outcomes
    }

    /// Prepare the first program synchronously. Failed attempts wait for the next event on
    /// the entry (or the attempt timeout) before trying again.
    pub fn load_initial(
        &mut self,
        entry: &Path,
    ) -> Result<SwapRequest<Compiler::Program, Uploader::Texture>, StartupError> {
        if self.config.kind_of(entry).is_none() {
            return Err(StartupError::UnsupportedEntry {
                path: entry.to_path_buf(),
            });
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.next_generation += 1;
            let generation = self.next_generation;
            self.debouncer.cancel(entry);
            self.status.record_attempt();

            let failure = match self.prepare(entry, generation, false) {
                Ok(Attempt::Ready(prepared)) => {
                    let outcome = ReloadOutcome::Submitted { generation };
                    self.status.record_outcome(&outcome);
                    self.transition(ReloadState::Idle);
                    tracing::info!(
                        target: "reload::coordinator",
                        path = %entry.display(),
                        generation,
                        attempts,
                        "initial program loaded"
                    );
                    return Ok(SwapRequest {
                        generation,
                        path: entry.to_path_buf(),
                        program: prepared.program,
                        texture: prepared.texture,
                        summary: prepared.summary,
                    });
                }
                Ok(Attempt::Superseded | Attempt::Unchanged) => continue,
                Err(failure) => failure,
            };

            self.fail(&failure);
            if attempts >= self.config.startup_retry_limit {
                return Err(StartupError::RetriesExhausted {
                    attempts,
                    last: failure,
                });
            }
            tracing::warn!(
                target: "reload::coordinator",
                attempts,
                limit = self.config.startup_retry_limit,
                "waiting for a fix before retrying the initial load"
            );
            if !self.wait_for_entry_change(entry) {
                return Err(StartupError::EventsClosed {
                    attempts,
                    last: failure,
                });
            }
        }
    }

    /// Wait for an event on `entry` and let its burst settle. Returns `false` once the
    /// event channel is closed. Reaching the attempt timeout returns `true`.
    fn wait_for_entry_change(&mut self, entry: &Path) -> bool {
        let deadline = Instant::now() + self.config.startup_attempt_timeout;
        while self.debouncer.pending_generation(entry).is_none() {
            if Instant::now() >= deadline {
                return true;
            }
            self.wait_for_event(Some(deadline));
            if self.events_closed {
                return false;
            }
        }
        while let Some(due_at) = self.debouncer.deadline_for(entry) {
            if Instant::now() >= due_at {
                break;
            }
            self.wait_for_event(Some(due_at));
            if self.events_closed {
                return false;
            }
        }
        true
    }

    fn run(&mut self, path: PathBuf, generation: u64) -> ReloadOutcome {
        self.status.record_attempt();
        let outcome = match self.prepare(&path, generation, true) {
            Ok(Attempt::Ready(prepared)) => self.submit(path.clone(), generation, prepared),
            Ok(Attempt::Superseded) => Ok(self.superseded(&path, generation)),
            Ok(Attempt::Unchanged) => {
                tracing::debug!(
                    target: "reload::coordinator",
                    path = %path.display(),
                    "brick matches our own write; skipped"
                );
                Ok(ReloadOutcome::Unchanged)
            }
            Err(failure) => Err(failure),
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(failure) => self.fail(&failure),
        };
        self.status.record_outcome(&outcome);
        self.transition(ReloadState::Idle);
        outcome
    }

    fn prepare(
        &mut self,
        path: &Path,
        generation: u64,
        cancellable: bool,
    ) -> Result<Attempt<Prepared<Compiler::Program, Uploader::Texture>>, ReloadFailure> {
        let (brick, report, decoded) = match self.config.kind_of(path) {
            Some(ReloadKind::Source) => self.fold_source(path)?,
            Some(ReloadKind::Brick) => match self.load_brick(path)? {
                Some(loaded) => loaded,
                None => return Ok(Attempt::Unchanged),
            },
            None => {
                return Err(ReloadFailure::new(
                    ReloadStage::Reading,
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "not a source or brick path",
                    ),
                ));
            }
        };
        if cancellable && self.is_superseded(path) {
            return Ok(Attempt::Superseded);
        }

        let summary = BrickSummary::describe(&brick, &report);
        self.status.record_brick(&summary);
        let text = match String::from_utf8_lossy(&decoded) {
            Cow::Borrowed(text) => Cow::Borrowed(text),
            Cow::Owned(text) => {
                tracing::warn!(
                    target: "reload::coordinator",
                    path = %path.display(),
                    "decoded program is not valid UTF-8; invalid sequences replaced"
                );
                Cow::Owned(text)
            }
        };

        self.transition(ReloadState::Compiling(path.to_path_buf()));
        let program = self
            .compiler
            .compile(&text)
            .map_err(|error| ReloadFailure::new(ReloadStage::Compiling, path, error))?;
        if cancellable && self.is_superseded(path) {
            return Ok(Attempt::Superseded);
        }

        self.transition(ReloadState::Uploading(path.to_path_buf()));
        let texture = self
            .uploader
            .upload(&brick)
            .map_err(|error| ReloadFailure::new(ReloadStage::Uploading, path, error))?;

        tracing::debug!(
            target: "reload::coordinator",
            path = %path.display(),
            generation,
            side = summary.side,
            entropy = summary.entropy,
            "program prepared"
        );
        Ok(Attempt::Ready(Prepared {
            program,
            texture,
            summary,
        }))
    }

    /// Read a source, fold it, check the fold decodes back, and replace its brick on disk.
    fn fold_source(
        &mut self,
        path: &Path,
    ) -> Result<(Brick, ValidationReport, Vec<u8>), ReloadFailure> {
        self.transition(ReloadState::Encoding(path.to_path_buf()));
        let source = std::fs::read(path)
            .map_err(|error| ReloadFailure::new(ReloadStage::Reading, path, error))?;

        let encoded = match self.config.order {
            Some(order) => brick::encode(&source, order, self.config.bytes_per_pixel),
            None => brick::encode_fit(&source, self.config.bytes_per_pixel, self.config.min_order),
        };
        let brick =
            encoded.map_err(|error| ReloadFailure::new(ReloadStage::Encoding, path, error))?;

        let report = self
            .validator
            .validate(&brick)
            .map_err(|error| ReloadFailure::new(ReloadStage::Validating, path, error))?;
        if !report.is_clean() {
            return Err(ReloadFailure::new(
                ReloadStage::Encoding,
                path,
                ReloadError::SelfCheck(format!("{} warning(s) on a fresh brick", report.warnings.len())),
            ));
        }
        let decoded = brick::decode(&brick)
            .map_err(|error| ReloadFailure::new(ReloadStage::Decoding, path, error))?;
        if decoded != source {
            return Err(ReloadFailure::new(
                ReloadStage::Encoding,
                path,
                ReloadError::SelfCheck("decoded bytes differ from the source".to_string()),
            ));
        }

        let brick_path = self.config.brick_path_for(path);
        let written = brick::write_brick_atomic(&brick_path, &brick)
            .map_err(|error| ReloadFailure::new(ReloadStage::Writing, path, error))?;
        self.written_digests.insert(brick_path, content_digest(&written));
        tracing::debug!(
            target: "reload::coordinator",
            source = %path.display(),
            order = brick.header.order,
            entropy = brick.header.entropy,
            "source folded"
        );
        Ok((brick, report, decoded))
    }

    /// Load a brick as found on disk. `None` when it is a brick this coordinator wrote.
    fn load_brick(
        &mut self,
        path: &Path,
    ) -> Result<Option<(Brick, ValidationReport, Vec<u8>)>, ReloadFailure> {
        self.transition(ReloadState::Decoding(path.to_path_buf()));
        let bytes = std::fs::read(path)
            .map_err(|error| ReloadFailure::new(ReloadStage::Reading, path, error))?;
        if self.written_digests.get(path) == Some(&content_digest(&bytes)) {
            return Ok(None);
        }

        let brick = Brick::from_bytes(&bytes)
            .map_err(|error| ReloadFailure::new(ReloadStage::Reading, path, error))?;
        let report = self
            .validator
            .validate(&brick)
            .map_err(|error| ReloadFailure::new(ReloadStage::Validating, path, error))?;
        for warning in &report.warnings {
            tracing::warn!(
                target: "reload::coordinator",
                path = %path.display(),
                %warning,
                "loading brick despite warning"
            );
        }
        let decoded = brick::decode(&brick)
            .map_err(|error| ReloadFailure::new(ReloadStage::Decoding, path, error))?;
        Ok(Some((brick, report, decoded)))
    }

    fn submit(
        &mut self,
        path: PathBuf,
        generation: u64,
        prepared: Prepared<Compiler::Program, Uploader::Texture>,
    ) -> Result<ReloadOutcome, ReloadFailure> {
        if self.is_superseded(&path) {
            return Ok(self.superseded(&path, generation));
        }
        self.transition(ReloadState::Swapping(path.clone()));

        let request = SwapRequest {
            generation,
            path,
            program: prepared.program,
            texture: prepared.texture,
            summary: prepared.summary,
        };
        if let Some(blocked) = self.blocked.take() {
            tracing::debug!(
                target: "reload::coordinator",
                dropped = blocked.generation,
                replacement = generation,
                "blocked swap replaced by newer request"
            );
        }
        self.push_swap(request)?;
        Ok(ReloadOutcome::Submitted { generation })
    }

    fn push_swap(
        &mut self,
        request: SwapRequest<Compiler::Program, Uploader::Texture>,
    ) -> Result<(), ReloadFailure> {
        if self.swaps.is_abandoned() {
            return Err(ReloadFailure::new(
                ReloadStage::Swapping,
                request.path,
                ReloadError::SwapQueueClosed,
            ));
        }
        let generation = request.generation;
        let path = request.path.clone();
        match self.swaps.push(request) {
            Ok(()) => {
                tracing::info!(
                    target: "reload::coordinator",
                    path = %path.display(),
                    generation,
                    "swap requested"
                );
            }
            Err(PushError::Full(request)) => {
                tracing::debug!(
                    target: "reload::coordinator",
                    generation,
                    "swap ring full; holding request"
                );
                self.blocked = Some(request);
            }
        }
        Ok(())
    }

    fn retry_blocked(&mut self) {
        let Some(request) = self.blocked.take() else {
            return;
        };
        if let Err(failure) = self.push_swap(request) {
            let outcome = self.fail(&failure);
            self.status.record_outcome(&outcome);
        }
    }

    fn is_superseded(&mut self, path: &Path) -> bool {
        self.drain_inbox();
        self.debouncer.pending_generation(path).is_some()
    }

    fn superseded(&mut self, path: &Path, generation: u64) -> ReloadOutcome {
        tracing::debug!(
            target: "reload::coordinator",
            path = %path.display(),
            generation,
            newer = self.debouncer.pending_generation(path),
            "attempt superseded"
        );
        ReloadOutcome::Superseded { generation }
    }

    fn fail(&mut self, failure: &ReloadFailure) -> ReloadOutcome {
        let reason = failure.error.to_string();
        tracing::warn!(
            target: "reload::coordinator",
            path = %failure.path.display(),
            stage = %failure.stage,
            %reason,
            "reload failed; keeping the active program"
        );
        self.transition(ReloadState::Failed(failure.path.clone(), reason.clone()));
        ReloadOutcome::Failed {
            stage: failure.stage,
            reason,
        }
    }

    fn transition(&mut self, next: ReloadState) {
        if self.state == next {
            return;
        }
        tracing::debug!(
            target: "reload::coordinator",
            from = ?self.state.phase(),
            to = ?next.phase(),
            path = ?next.path(),
            "state transition"
        );
        self.status.set_phase(next.phase(), next.path());
        self.state = next;
    }
}
