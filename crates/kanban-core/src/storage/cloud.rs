//! Cloud document backend
//!
//! The whole board lives in one JSON document `{ projects, updatedAt }` at a
//! fixed path of a remote document store. Live updates are delivered by a
//! polling watcher that reports the document whenever its `updatedAt`
//! changes.
//!
//! A failed first connection records a cooldown timestamp in the local
//! store. Until it elapses, loads, saves and watcher polls fail fast with
//! [`Error::CoolingDown`] instead of reaching the network. Once any request
//! has succeeded, later failures surface as plain errors and never trip the
//! cooldown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::local::{COOLDOWN_KEY, LocalStore};
use super::{StorageBackend, Subscription, SubscriptionEvent};
use crate::board::Project;
use crate::config::CloudConfig;
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("kanban/", env!("CARGO_PKG_VERSION"));

/// Buffered watcher events before the watcher waits on the consumer
const EVENT_BUFFER: usize = 16;

fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// The stored board document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDocument {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl CloudDocument {
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects,
            updated_at: Utc::now(),
        }
    }
}

/// Access to the single board document
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Read the document; `None` when it does not exist yet
    async fn get(&self) -> Result<Option<CloudDocument>>;

    /// Create or replace the document
    async fn put(&self, document: &CloudDocument) -> Result<()>;
}

/// Document store reached over HTTP
///
/// `GET`/`PUT {base_url}/documents/{path}` with a JSON body and bearer auth.
#[derive(Clone)]
pub struct HttpDocumentApi {
    http_client: HttpClient,
    url: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpDocumentApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDocumentApi")
            .field("url", &self.url)
            .field("token", &self.token.is_some())
            .finish()
    }
}

impl HttpDocumentApi {
    pub fn new(config: &CloudConfig, token: Option<String>) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::ConfigError("cloud.base_url is not set".to_string()));
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            url: format!(
                "{}/documents/{}",
                config.base_url.trim_end_matches('/'),
                config.document_path.trim_matches('/')
            ),
            token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn get(&self) -> Result<Option<CloudDocument>> {
        debug!(url = %self.url, "Fetching cloud document");

        let response = self
            .authorized(self.http_client.get(&self.url))
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LoadFailure(format!("cloud document returned {}: {}", status, body)));
        }

        let document = response
            .json::<CloudDocument>()
            .await
            .map_err(|e| Error::LoadFailure(format!("cloud document is malformed: {}", e)))?;
        Ok(Some(document))
    }

    async fn put(&self, document: &CloudDocument) -> Result<()> {
        debug!(url = %self.url, projects = document.projects.len(), "Writing cloud document");

        let response = self
            .authorized(self.http_client.put(&self.url))
            .json(document)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SaveFailure(format!("cloud document returned {}: {}", status, body)));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CooldownRecord {
    until: DateTime<Utc>,
}

/// Persisted reconnect cooldown
#[derive(Debug, Clone)]
pub struct CooldownGate {
    local: LocalStore,
    cooldown: Duration,
}

impl CooldownGate {
    pub fn new(local: LocalStore, cooldown: Duration) -> Self {
        Self { local, cooldown }
    }

    /// End of the active cooldown, if one is running at `now`
    pub fn active_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.local.get::<CooldownRecord>(COOLDOWN_KEY) {
            Ok(Some(record)) if record.until > now => Some(record.until),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cooldown record");
                None
            }
        }
    }

    /// Fail fast while a cooldown is running
    pub fn check(&self) -> Result<()> {
        match self.active_until(Utc::now()) {
            Some(until) => Err(Error::CoolingDown(until.to_rfc3339())),
            None => Ok(()),
        }
    }

    /// Start a cooldown after a failed connection
    pub fn trip(&self, now: DateTime<Utc>) {
        let Ok(delta) = TimeDelta::from_std(self.cooldown) else {
            return;
        };
        let until = now + delta;
        match self.local.set(COOLDOWN_KEY, &CooldownRecord { until }) {
            Ok(()) => warn!(until = %until, "Cloud connection failed; cooling down"),
            Err(e) => warn!(error = %e, "Failed to record cloud cooldown"),
        }
    }

    /// Forget any cooldown after a successful connection
    pub fn reset(&self) {
        if let Err(e) = self.local.remove(COOLDOWN_KEY) {
            warn!(error = %e, "Failed to clear cloud cooldown");
        }
    }
}

/// Board persisted as one cloud document
pub struct CloudDocumentBackend {
    api: Arc<dyn DocumentApi>,
    gate: Option<CooldownGate>,
    /// Set by the first successful request from the backend or its watcher
    connected: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl std::fmt::Debug for CloudDocumentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudDocumentBackend")
            .field("cooldown", &self.gate.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl CloudDocumentBackend {
    pub fn new(api: Arc<dyn DocumentApi>, poll_interval: Duration) -> Self {
        Self {
            api,
            gate: None,
            connected: Arc::new(AtomicBool::new(false)),
            poll_interval,
        }
    }

    /// Guard connections with a persisted cooldown
    pub fn with_cooldown(mut self, gate: CooldownGate) -> Self {
        self.gate = Some(gate);
        self
    }

    fn check_gate(&self) -> Result<()> {
        self.gate.as_ref().map_or(Ok(()), CooldownGate::check)
    }

    /// Whether any request has reached the document store
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn record_outcome<T>(&self, result: &Result<T>) {
        record_outcome(self.gate.as_ref(), &self.connected, result);
    }
}

/// Track the connection; only a failure before the first success starts a cooldown
fn record_outcome<T>(gate: Option<&CooldownGate>, connected: &AtomicBool, result: &Result<T>) {
    match result {
        Ok(_) => {
            if !connected.swap(true, Ordering::SeqCst)
                && let Some(gate) = gate
            {
                gate.reset();
            }
        }
        Err(e) if is_connection_failure(e) && !connected.load(Ordering::SeqCst) => {
            if let Some(gate) = gate {
                gate.trip(Utc::now());
            }
        }
        Err(_) => {}
    }
}

fn is_connection_failure(error: &Error) -> bool {
    matches!(error, Error::NetworkError(_) | Error::Timeout(_))
}

#[async_trait]
impl StorageBackend for CloudDocumentBackend {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn load(&self) -> Result<Vec<Project>> {
        self.check_gate()?;
        let result = self.api.get().await;
        self.record_outcome(&result);
        let document = result?;
        Ok(document.map(|d| d.projects).unwrap_or_default())
    }

    async fn save(&self, projects: &[Project]) -> Result<()> {
        self.check_gate()?;
        let result = self.api.put(&CloudDocument::new(projects.to_vec())).await;
        self.record_outcome(&result);
        result
    }

    fn subscribe(&self) -> Option<Subscription> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        tokio::spawn(watch_document(
            Arc::clone(&self.api),
            self.gate.clone(),
            Arc::clone(&self.connected),
            self.poll_interval,
            tx,
            cancel.clone(),
        ));

        info!(interval_secs = self.poll_interval.as_secs(), "Subscribed to cloud document");
        Some(Subscription::new(rx, cancel))
    }
}

/// Poll the document, reporting it whenever its `updatedAt` moves
async fn watch_document(
    api: Arc<dyn DocumentApi>,
    gate: Option<CooldownGate>,
    connected: Arc<AtomicBool>,
    interval: Duration,
    tx: mpsc::Sender<SubscriptionEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen: Option<DateTime<Utc>> = None;
    let mut delivered = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let event = if let Some(Err(e)) = gate.as_ref().map(CooldownGate::check) {
            // Report the cooldown once, then stay quiet until it ends
            (!delivered).then(|| SubscriptionEvent::Error(e.to_string()))
        } else {
            let result = api.get().await;
            record_outcome(gate.as_ref(), &connected, &result);
            match result {
                Ok(Some(document)) => (last_seen != Some(document.updated_at)).then(|| {
                    last_seen = Some(document.updated_at);
                    SubscriptionEvent::Data(document.projects)
                }),
                Ok(None) => (!delivered || last_seen.is_some()).then(|| {
                    last_seen = None;
                    SubscriptionEvent::Missing
                }),
                Err(e) => {
                    warn!(error = %e, "Cloud document poll failed");
                    Some(SubscriptionEvent::Error(e.to_string()))
                }
            }
        };

        delivered = true;
        if let Some(event) = event
            && tx.send(event).await.is_err()
        {
            break;
        }
    }

    debug!("Cloud document watcher stopped");
}
