//! Debounced, coalescing writes to a remote backend

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use crate::board::Project;
use crate::error::{Error, Result};
use crate::storage::{StorageBackend, Subscription, fingerprint};

/// What the remote side of the board is doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// No remote backend is configured
    LocalOnly,
    /// Connected, nothing waiting
    Idle,
    /// Local changes are waiting for the debounce window
    Pending,
    /// A write is in flight
    Saving,
    Synced { at: DateTime<Utc> },
    Error { message: String },
}

impl SyncStatus {
    pub fn label(&self) -> String {
        match self {
            SyncStatus::LocalOnly => "local only".to_string(),
            SyncStatus::Idle => "idle".to_string(),
            SyncStatus::Pending => "changes pending".to_string(),
            SyncStatus::Saving => "saving...".to_string(),
            SyncStatus::Synced { at } => format!("synced {}", at.format("%H:%M:%S")),
            SyncStatus::Error { message } => format!("sync error: {}", message),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Error { .. })
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Result of one save attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Nothing new to write
    Skipped,
    /// Another save was in flight; a follow-up is scheduled after it
    Deferred,
}

#[derive(Debug, Default)]
struct EngineState {
    latest: Option<Vec<Project>>,
    in_flight: bool,
    pending: bool,
    last_saved: Option<String>,
    synced_at: Option<DateTime<Utc>>,
}

/// Owns every write to one remote backend
pub struct SyncEngine {
    backend: Arc<dyn StorageBackend>,
    debouncer: Debouncer,
    load_timeout: Duration,
    state: Mutex<EngineState>,
    idle: Notify,
    status_tx: watch::Sender<SyncStatus>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("backend", &self.backend.name())
            .field("debounce", &self.debouncer.window())
            .field("status", &*self.status_tx.borrow())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, debounce: Duration, load_timeout: Duration) -> Arc<Self> {
        let (status_tx, _) = watch::channel(SyncStatus::Idle);
        Arc::new(Self {
            backend,
            debouncer: Debouncer::new(debounce),
            load_timeout,
            state: Mutex::new(EngineState::default()),
            idle: Notify::new(),
            status_tx,
        })
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: SyncStatus) {
        self.status_tx.send_replace(status);
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Initial load, abandoned after the configured timeout
    pub async fn load_with_timeout(&self) -> Result<Vec<Project>> {
        let result = match tokio::time::timeout(self.load_timeout, self.backend.load()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.load_timeout.as_secs())),
        };

        match &result {
            Ok(projects) => {
                info!(backend = self.backend.name(), count = projects.len(), "Loaded remote projects");
                self.mark_synced(projects);
                self.set_status(SyncStatus::Idle);
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Remote load failed");
                self.set_status(SyncStatus::Error { message: e.to_string() });
            }
        }
        result
    }

    /// Queue `snapshot` for a debounced write, superseding any earlier one
    pub fn schedule(self: &Arc<Self>, snapshot: Vec<Project>) {
        self.state().latest = Some(snapshot);
        self.set_status(SyncStatus::Pending);
        self.arm();
    }

    fn arm(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        self.debouncer.schedule(async move {
            if let Err(e) = engine.save_once().await {
                warn!(backend = engine.backend.name(), error = %e, "Debounced save failed");
            }
        });
    }

    /// Write the newest queued snapshot now
    ///
    /// Cancels the debounce timer and waits for an in-flight save first, so
    /// the returned outcome reflects the newest state.
    pub async fn flush(self: &Arc<Self>) -> Result<SaveOutcome> {
        loop {
            self.debouncer.cancel();

            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let in_flight = self.state().in_flight;
            if in_flight {
                notified.await;
                continue;
            }

            match self.save_once().await? {
                SaveOutcome::Deferred => continue,
                outcome => {
                    // Edits made during the save stay queued behind their timer
                    if self.state().latest.is_none() {
                        self.debouncer.cancel();
                    }
                    return Ok(outcome);
                }
            }
        }
    }

    /// Replace the queued snapshot without arming the timer
    pub fn queue(&self, snapshot: Vec<Project>) {
        self.state().latest = Some(snapshot);
        self.set_status(SyncStatus::Pending);
    }

    /// Replace the queued snapshot with `snapshot` and write it now
    pub async fn save_now(self: &Arc<Self>, snapshot: Vec<Project>) -> Result<SaveOutcome> {
        self.queue(snapshot);
        self.flush().await
    }

    async fn save_once(self: &Arc<Self>) -> Result<SaveOutcome> {
        let (snapshot, digest) = {
            let mut state = self.state();
            if state.in_flight {
                state.pending = true;
                debug!("Save already in flight; coalescing");
                return Ok(SaveOutcome::Deferred);
            }
            let Some(snapshot) = state.latest.take() else {
                return Ok(SaveOutcome::Skipped);
            };
            let digest = fingerprint(&snapshot);
            if state.last_saved.as_deref() == Some(digest.as_str()) {
                let status = state.synced_at.map_or(SyncStatus::Idle, |at| SyncStatus::Synced { at });
                drop(state);
                debug!("Snapshot unchanged since last save; skipping");
                self.set_status(status);
                return Ok(SaveOutcome::Skipped);
            }
            state.in_flight = true;
            (snapshot, digest)
        };

        self.set_status(SyncStatus::Saving);
        debug!(backend = self.backend.name(), count = snapshot.len(), "Saving snapshot");
        let result = self.backend.save(&snapshot).await;

        let (follow_up, status) = {
            let mut state = self.state();
            state.in_flight = false;
            let status = match &result {
                Ok(()) => {
                    let now = Utc::now();
                    state.last_saved = Some(digest);
                    state.synced_at = Some(now);
                    if state.latest.is_some() {
                        SyncStatus::Pending
                    } else {
                        SyncStatus::Synced { at: now }
                    }
                }
                Err(e) => {
                    if state.latest.is_none() {
                        state.latest = Some(snapshot);
                    }
                    SyncStatus::Error { message: e.to_string() }
                }
            };
            let follow_up = std::mem::take(&mut state.pending) && state.latest.is_some();
            (follow_up, status)
        };

        self.set_status(status);
        self.idle.notify_waiters();
        if follow_up {
            debug!("Scheduling coalesced follow-up save");
            self.arm();
        }

        match result {
            Ok(()) => {
                info!(backend = self.backend.name(), "Saved projects");
                Ok(SaveOutcome::Saved)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the queued snapshot and disarm the timer (before a reload)
    pub fn cancel_pending(&self) {
        let cancelled = self.debouncer.cancel();
        let had_snapshot = {
            let mut state = self.state();
            state.pending = false;
            state.latest.take().is_some()
        };
        if cancelled || had_snapshot {
            debug!("Cancelled pending save");
        }
        if matches!(self.status(), SyncStatus::Pending) {
            self.set_status(SyncStatus::Idle);
        }
    }

    /// Local changes not yet confirmed by the backend
    pub fn has_unsent_changes(&self) -> bool {
        let state = self.state();
        state.latest.is_some() || state.in_flight
    }

    /// Whether `projects` matches what the backend last confirmed
    pub fn is_current(&self, projects: &[Project]) -> bool {
        self.state().last_saved.as_deref() == Some(fingerprint(projects).as_str())
    }

    /// Record `projects` as the backend's current content
    pub fn mark_synced(&self, projects: &[Project]) {
        self.state().last_saved = Some(fingerprint(projects));
    }

    /// Forget what the backend holds, so the next save is never skipped
    pub fn invalidate(&self) {
        self.state().last_saved = None;
    }

    pub fn subscribe(&self) -> Option<Subscription> {
        self.backend.subscribe()
    }
}
