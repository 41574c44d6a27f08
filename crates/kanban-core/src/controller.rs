//! Board controller
//!
//! The one object front-ends talk to. It owns the [`ProjectStore`], the view
//! [`Selection`] and the persistence wiring: every effective mutation is
//! written to the local store at once and, when a remote backend is
//! configured, queued on its [`SyncEngine`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::board::{Column, NewProject, Project, ProjectPatch, ProjectStore, Selection, Stage, columns};
use crate::config::{BackendKind, Config};
use crate::error::{Error, Result};
use crate::storage::{
    CloudDocumentBackend, CooldownGate, GithubFileApi, HttpDocumentApi, LocalStore,
    RemoteFileBackend, StorageBackend, Subscription, SubscriptionEvent,
};
use crate::sync::{SaveOutcome, SyncEngine, SyncStatus};

/// Where the startup collection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// The local cache (no remote configured, or the remote was empty)
    Local,
    /// The remote backend
    Remote,
    /// The remote failed; the local cache was used instead
    LocalFallback,
    /// Nothing stored anywhere yet
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub source: LoadSource,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadReport {
    fn new(source: LoadSource, count: usize) -> Self {
        let source = if count == 0 && source == LoadSource::Local {
            LoadSource::Empty
        } else {
            source
        };
        Self {
            source,
            count,
            error: None,
        }
    }
}

fn config_error(e: anyhow::Error) -> Error {
    Error::ConfigError(format!("{:#}", e))
}

pub struct BoardController {
    store: ProjectStore,
    selection: Selection,
    local: LocalStore,
    remote: Option<Arc<SyncEngine>>,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for BoardController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardController")
            .field("projects", &self.store.len())
            .field("local", &self.local.dir())
            .field("remote", &self.remote.as_ref().map(|e| e.backend_name()))
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}

impl BoardController {
    pub fn new(local: LocalStore, remote: Option<Arc<SyncEngine>>) -> Self {
        Self::with_store(ProjectStore::new(), local, remote)
    }

    pub fn with_store(store: ProjectStore, local: LocalStore, remote: Option<Arc<SyncEngine>>) -> Self {
        Self {
            store,
            selection: Selection::new(),
            local,
            remote,
            subscription: None,
        }
    }

    /// Build the controller for the configured backend
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().map_err(config_error)?;

        let data_dir = config.storage.resolved_data_dir().map_err(config_error)?;
        let local = LocalStore::open(data_dir)?;
        let load_timeout = config.storage.load_timeout();

        let remote = match config.storage.backend {
            BackendKind::Local => None,
            BackendKind::Cloud => {
                let token = config.cloud.resolved_token().map_err(config_error)?;
                let api = HttpDocumentApi::new(&config.cloud, token)?;
                let backend = CloudDocumentBackend::new(Arc::new(api), config.cloud.poll_interval())
                    .with_cooldown(CooldownGate::new(local.clone(), config.cloud.cooldown()));
                Some(SyncEngine::new(
                    Arc::new(backend) as Arc<dyn StorageBackend>,
                    config.cloud.debounce(),
                    load_timeout,
                ))
            }
            BackendKind::RemoteFile => {
                let token = config.remote_file.resolved_token().map_err(config_error)?;
                let api = GithubFileApi::new(&config.remote_file, token)?;
                Some(SyncEngine::new(
                    Arc::new(RemoteFileBackend::new(api)) as Arc<dyn StorageBackend>,
                    config.remote_file.debounce(),
                    load_timeout,
                ))
            }
        };

        debug!(backend = config.storage.backend.as_str(), dir = %local.dir().display(), "Controller configured");
        Ok(Self::new(local, remote))
    }

    /// Load the board: remote first when configured, local cache otherwise
    ///
    /// Never fails. A remote failure falls back to the local cache and is
    /// reported in [`LoadReport::error`].
    pub async fn start(&mut self) -> LoadReport {
        let cached = match self.local.read_projects() {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "Local cache unreadable; starting empty");
                Vec::new()
            }
        };

        let Some(engine) = self.remote.clone() else {
            self.store.replace_all(cached);
            return LoadReport::new(LoadSource::Local, self.store.len());
        };

        match engine.load_with_timeout().await {
            Ok(remote) if remote.is_empty() && !cached.is_empty() => {
                info!(count = cached.len(), "Remote is empty; seeding it from the local cache");
                self.store.replace_all(cached);
                engine.schedule(self.store.snapshot());
                LoadReport::new(LoadSource::Local, self.store.len())
            }
            Ok(remote) => {
                self.store.replace_all(remote);
                self.write_local();
                LoadReport::new(LoadSource::Remote, self.store.len())
            }
            Err(e) => {
                warn!(error = %e, count = cached.len(), "Falling back to local cache");
                self.store.replace_all(cached);
                LoadReport {
                    error: Some(e.to_string()),
                    ..LoadReport::new(LoadSource::LocalFallback, self.store.len())
                }
            }
        }
    }

    /// Start receiving pushed remote updates, if the backend supports them
    pub fn watch_remote(&mut self) -> bool {
        if self.subscription.is_none() {
            self.subscription = self.remote.as_ref().and_then(|engine| engine.subscribe());
        }
        self.subscription.is_some()
    }

    fn write_local(&self) {
        if let Err(e) = self.local.write_projects(self.store.projects()) {
            warn!(error = %e, "Failed to write local cache");
        }
    }

    fn persist(&mut self) {
        self.write_local();
        if let Some(engine) = &self.remote {
            engine.schedule(self.store.snapshot());
        }
    }

    fn persist_if(&mut self, changed: bool) -> bool {
        if changed {
            self.persist();
        }
        changed
    }

    pub fn add(&mut self, input: NewProject) -> Result<String> {
        let id = self.store.add(input)?;
        self.persist();
        Ok(id)
    }

    pub fn move_to(&mut self, id: &str, stage: Stage) -> bool {
        let changed = self.store.move_to(id, stage);
        self.persist_if(changed)
    }

    /// Move one stage forward; returns the new stage
    pub fn advance(&mut self, id: &str) -> Option<Stage> {
        let next = self.store.get(id)?.stage.next()?;
        self.move_to(id, next).then_some(next)
    }

    /// Move one stage back; returns the new stage
    pub fn retreat(&mut self, id: &str) -> Option<Stage> {
        let prev = self.store.get(id)?.stage.prev()?;
        self.move_to(id, prev).then_some(prev)
    }

    pub fn archive(&mut self, id: &str) -> bool {
        let changed = self.store.archive(id);
        self.persist_if(changed)
    }

    pub fn update(&mut self, id: &str, patch: ProjectPatch) -> bool {
        let changed = self.store.update(id, patch);
        self.persist_if(changed)
    }

    pub fn annotate(&mut self, id: &str, notes: impl Into<String>) -> bool {
        let changed = self.store.annotate(id, notes);
        self.persist_if(changed)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let changed = self.store.delete(id);
        if changed {
            self.selection.on_deleted(id);
        }
        self.persist_if(changed)
    }

    /// Remove every project, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.store.len();
        self.store.clear();
        self.selection.close();
        self.persist_if(removed > 0);
        removed
    }

    /// Add existing records, keeping their ids; returns how many were new
    pub fn import(&mut self, projects: Vec<Project>) -> usize {
        let added = projects
            .into_iter()
            .map(|project| self.store.insert(project))
            .filter(|inserted| *inserted)
            .count();
        self.persist_if(added > 0);
        added
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.store.get(id)
    }

    /// Look up by id or unique id prefix
    pub fn resolve(&self, id_or_prefix: &str) -> Option<&Project> {
        self.store.resolve(id_or_prefix)
    }

    /// Look up by id or prefix, failing with [`Error::ProjectNotFound`]
    pub fn require(&self, id_or_prefix: &str) -> Result<&Project> {
        self.resolve(id_or_prefix)
            .ok_or_else(|| Error::ProjectNotFound(id_or_prefix.to_string()))
    }

    pub fn list(&self, stage: Option<Stage>) -> Vec<&Project> {
        match stage {
            Some(stage) => self.store.by_stage(stage).collect(),
            None => self.store.projects().iter().collect(),
        }
    }

    pub fn columns(&self) -> Vec<Column<'_>> {
        columns(&self.store)
    }

    /// Select a project; unknown ids leave the selection unchanged
    pub fn select(&mut self, id: &str) -> bool {
        if self.store.get(id).is_none() {
            return false;
        }
        self.selection.select(id);
        true
    }

    pub fn close_selection(&mut self) {
        self.selection.close();
    }

    pub fn selected(&self) -> Option<&Project> {
        self.selection.project(&self.store)
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn backend_name(&self) -> &'static str {
        self.remote.as_ref().map_or("local", |engine| engine.backend_name())
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.remote
            .as_ref()
            .map_or(SyncStatus::LocalOnly, |engine| engine.status())
    }

    pub fn watch_status(&self) -> Option<watch::Receiver<SyncStatus>> {
        self.remote.as_ref().map(|engine| engine.watch_status())
    }

    /// Force a save of the current board, skipping the debounce window
    pub async fn sync(&mut self) -> Result<SaveOutcome> {
        match self.prepare_sync()? {
            Some(save) => save.await,
            None => Ok(SaveOutcome::Saved),
        }
    }

    /// Write the board locally and hand back the remote save, if any
    ///
    /// The returned future owns everything it needs, so a front-end can
    /// spawn it and keep rendering while it runs.
    pub fn prepare_sync(
        &mut self,
    ) -> Result<Option<impl Future<Output = Result<SaveOutcome>> + Send + use<>>> {
        self.local.write_projects(self.store.projects())?;
        Ok(self.remote.clone().map(|engine| {
            engine.queue(self.store.snapshot());
            async move { engine.flush().await }
        }))
    }

    /// Write out anything still queued for the remote
    pub async fn flush(&mut self) -> Result<SaveOutcome> {
        match &self.remote {
            Some(engine) => engine.flush().await,
            None => Ok(SaveOutcome::Skipped),
        }
    }

    /// Discard queued writes and reload the board from its source
    pub async fn refresh(&mut self) -> Result<usize> {
        let projects = match self.prepare_reload() {
            Some(load) => load.await?,
            None => self.local.read_projects()?,
        };
        Ok(self.finish_reload(projects))
    }

    /// Cancel queued writes and hand back the remote load, if any
    ///
    /// Without a remote the board reloads from the local store instead.
    /// Pass the loaded collection to [`finish_reload`](Self::finish_reload).
    pub fn prepare_reload(
        &mut self,
    ) -> Option<impl Future<Output = Result<Vec<Project>>> + Send + use<>> {
        self.remote.clone().map(|engine| {
            engine.cancel_pending();
            async move { engine.load_with_timeout().await }
        })
    }

    /// Replace the board with a reloaded collection
    pub fn finish_reload(&mut self, projects: Vec<Project>) -> usize {
        self.store.replace_all(projects);
        if self.remote.is_some() {
            self.write_local();
        }
        self.selection.retain_existing(&self.store);
        info!(count = self.store.len(), "Board refreshed");
        self.store.len()
    }

    /// Apply one pushed remote update; returns whether the board changed
    ///
    /// Updates are ignored while local changes are still unsent, and when
    /// they carry what was last synced.
    pub fn apply_remote_event(&mut self, event: SubscriptionEvent) -> bool {
        let Some(engine) = self.remote.clone() else {
            return false;
        };

        match event {
            SubscriptionEvent::Data(projects) => {
                if engine.has_unsent_changes() {
                    debug!("Ignoring remote update while local changes are unsent");
                    return false;
                }
                if engine.is_current(&projects) {
                    return false;
                }
                info!(count = projects.len(), "Applying remote update");
                engine.mark_synced(&projects);
                self.store.replace_all(projects);
                self.selection.retain_existing(&self.store);
                self.write_local();
                true
            }
            SubscriptionEvent::Missing => {
                if !self.store.is_empty() && !engine.has_unsent_changes() {
                    info!(count = self.store.len(), "Remote document missing; seeding it");
                    engine.invalidate();
                    engine.schedule(self.store.snapshot());
                }
                false
            }
            SubscriptionEvent::Error(message) => {
                warn!(error = %message, "Remote subscription error");
                false
            }
        }
    }

    /// Apply every already delivered remote update
    pub fn poll_remote(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            changed |= self.apply_remote_event(event);
        }
        changed
    }

    /// Wait for the next pushed update; pends forever without a subscription
    pub async fn next_remote_event(&mut self) -> Option<SubscriptionEvent> {
        match &mut self.subscription {
            Some(subscription) => subscription.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Stop watching the remote and write out queued changes
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.flush().await.map(|_| ())
    }
}
