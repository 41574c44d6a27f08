//! Remote file backend (GitHub contents API)
//!
//! The board is one JSON file in a repository. Every read returns the
//! file's blob `sha`, and every write must present the `sha` it expects to
//! replace. A mismatch means someone else committed in between: the backend
//! refetches the current `sha`, retries once, and only then reports
//! [`Error::ConflictFailure`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::StorageBackend;
use crate::board::Project;
use crate::config::RemoteFileConfig;
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("kanban/", env!("CARGO_PKG_VERSION"));
const GITHUB_API_VERSION: &str = "2022-11-28";

/// File content with its version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContent {
    pub content: Vec<u8>,
    pub sha: String,
}

/// Versioned single-file access
#[async_trait]
pub trait FileApi: Send + Sync {
    /// Current content and version token; `None` when the file does not exist
    async fn fetch(&self) -> Result<Option<RemoteContent>>;

    /// Conditionally write `content`, returning the new version token
    ///
    /// `expected_sha` is `None` when creating the file. A stale token fails
    /// with [`Error::ConflictFailure`].
    async fn put(&self, content: &[u8], expected_sha: Option<&str>, message: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: ContentsResponse,
}

/// GitHub contents API client for one file on one branch
#[derive(Clone)]
pub struct GithubFileApi {
    http_client: HttpClient,
    url: String,
    branch: String,
    token: Option<String>,
}

impl std::fmt::Debug for GithubFileApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubFileApi")
            .field("url", &self.url)
            .field("branch", &self.branch)
            .field("token", &self.token.is_some())
            .finish()
    }
}

impl GithubFileApi {
    pub fn new(config: &RemoteFileConfig, token: Option<String>) -> Result<Self> {
        if config.owner.trim().is_empty() || config.repo.trim().is_empty() {
            return Err(Error::ConfigError(
                "remote_file.owner and remote_file.repo must be set".to_string(),
            ));
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            url: format!(
                "{}/repos/{}/{}/contents/{}",
                config.api_base.trim_end_matches('/'),
                config.owner.trim(),
                config.repo.trim(),
                config.path.trim_matches('/')
            ),
            branch: config.branch.clone(),
            token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let request = self
            .http_client
            .request(method, &self.url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Decode the base64 payload GitHub wraps at 60 columns
fn decode_content(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| Error::LoadFailure(format!("remote file content is not valid base64: {}", e)))
}

#[async_trait]
impl FileApi for GithubFileApi {
    async fn fetch(&self) -> Result<Option<RemoteContent>> {
        debug!(url = %self.url, branch = %self.branch, "Fetching remote file");

        let response = self
            .request(reqwest::Method::GET)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LoadFailure(format!("remote file returned {}: {}", status, body)));
        }

        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| Error::LoadFailure(format!("unexpected contents response: {}", e)))?;

        Ok(Some(RemoteContent {
            content: decode_content(&contents.content)?,
            sha: contents.sha,
        }))
    }

    async fn put(&self, content: &[u8], expected_sha: Option<&str>, message: &str) -> Result<String> {
        debug!(
            url = %self.url,
            bytes = content.len(),
            has_sha = expected_sha.is_some(),
            "Writing remote file"
        );

        let body = PutContentsRequest {
            message,
            content: BASE64.encode(content),
            branch: &self.branch,
            sha: expected_sha,
        };

        let response = self
            .request(reqwest::Method::PUT)
            .json(&body)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if is_conflict_status(status) {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ConflictFailure(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SaveFailure(format!("remote file returned {}: {}", status, body)));
        }

        let written: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| Error::SaveFailure(format!("unexpected contents response: {}", e)))?;
        Ok(written.content.sha)
    }
}

/// Statuses meaning the expected sha no longer matches the file.
/// GitHub answers 422 when an existing file is written without a sha.
fn is_conflict_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED | StatusCode::UNPROCESSABLE_ENTITY
    )
}

/// Board persisted as one versioned file
pub struct RemoteFileBackend<A> {
    api: A,
    sha: Mutex<Option<String>>,
}

impl<A> std::fmt::Debug for RemoteFileBackend<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileBackend")
            .field("sha", &self.version())
            .finish()
    }
}

impl<A: FileApi> RemoteFileBackend<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            sha: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

impl<A> RemoteFileBackend<A> {
    /// Version token from the last load or successful save
    pub fn version(&self) -> Option<String> {
        self.sha
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_version(&self, sha: Option<String>) {
        *self.sha.lock().unwrap_or_else(|e| e.into_inner()) = sha;
    }
}

fn commit_message(projects: &[Project]) -> String {
    format!(
        "Update kanban projects ({} items) at {}",
        projects.len(),
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
}

fn parse_projects(content: &[u8]) -> Result<Vec<Project>> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(content)
        .map_err(|e| Error::LoadFailure(format!("remote file is not a project list: {}", e)))
}

#[async_trait]
impl<A: FileApi> StorageBackend for RemoteFileBackend<A> {
    fn name(&self) -> &'static str {
        "remote_file"
    }

    async fn load(&self) -> Result<Vec<Project>> {
        match self.api.fetch().await? {
            Some(remote) => {
                let projects = parse_projects(&remote.content)?;
                self.set_version(Some(remote.sha));
                Ok(projects)
            }
            None => {
                info!("Remote file does not exist yet");
                self.set_version(None);
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, projects: &[Project]) -> Result<()> {
        let mut content = serde_json::to_vec_pretty(projects)?;
        content.push(b'\n');
        let message = commit_message(projects);

        let expected = match self.version() {
            Some(sha) => Some(sha),
            // No token cached, e.g. the startup load fell back to the local copy
            None => {
                let current = self.api.fetch().await?.map(|remote| remote.sha);
                self.set_version(current.clone());
                current
            }
        };
        let result = self.api.put(&content, expected.as_deref(), &message).await;
        let sha = match result {
            Ok(sha) => sha,
            Err(Error::ConflictFailure(detail)) => {
                warn!(detail = %detail, "Remote file changed underneath us; refetching version");
                let fresh = self.api.fetch().await?.map(|remote| remote.sha);
                self.set_version(fresh.clone());
                self.api.put(&content, fresh.as_deref(), &message).await?
            }
            Err(e) => return Err(e),
        };

        self.set_version(Some(sha));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::board::{NewProject, ProjectStore, Stage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory versioned file; `sha` is a counter
    #[derive(Default)]
    pub(crate) struct MemoryFileApi {
        pub(crate) file: Mutex<Option<RemoteContent>>,
        pub(crate) versions: AtomicUsize,
        pub(crate) fetches: AtomicUsize,
        pub(crate) puts: AtomicUsize,
        /// Simulate another writer committing right before each of our puts
        pub(crate) racing_writers: AtomicUsize,
    }

    impl MemoryFileApi {
        pub(crate) fn external_write(&self, content: &[u8]) {
            let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
            *self.file.lock().unwrap() = Some(RemoteContent {
                content: content.to_vec(),
                sha: format!("sha-{}", version),
            });
        }
    }

    #[async_trait]
    impl FileApi for MemoryFileApi {
        async fn fetch(&self) -> Result<Option<RemoteContent>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.file.lock().unwrap().clone())
        }

        async fn put(&self, content: &[u8], expected_sha: Option<&str>, _message: &str) -> Result<String> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.racing_writers.load(Ordering::SeqCst) > 0 {
                self.racing_writers.fetch_sub(1, Ordering::SeqCst);
                self.external_write(b"[]");
            }

            let current = self.file.lock().unwrap().as_ref().map(|f| f.sha.clone());
            if current.as_deref() != expected_sha {
                return Err(Error::ConflictFailure(format!(
                    "expected {:?}, found {:?}",
                    expected_sha, current
                )));
            }
            self.external_write(content);
            Ok(self.file.lock().unwrap().as_ref().unwrap().sha.clone())
        }
    }

    fn sample_projects() -> Vec<Project> {
        let mut store = ProjectStore::new();
        store.add(NewProject::new("Codex CLI setup").with_stage(Stage::Finished)).unwrap();
        store.add(NewProject::new("Search API")).unwrap();
        store.snapshot()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty_and_creates_on_save() {
        let backend = RemoteFileBackend::new(MemoryFileApi::default());
        assert!(backend.load().await.unwrap().is_empty());
        assert_eq!(backend.version(), None);

        backend.save(&sample_projects()).await.unwrap();
        assert_eq!(backend.version().as_deref(), Some("sha-1"));
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let backend = RemoteFileBackend::new(MemoryFileApi::default());
        let projects = sample_projects();
        backend.save(&projects).await.unwrap();

        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded, projects);
        backend.save(&loaded).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), projects);
    }

    #[tokio::test]
    async fn test_stale_token_retries_exactly_once() {
        let api = MemoryFileApi::default();
        api.external_write(b"[]");
        let backend = RemoteFileBackend::new(api);
        backend.load().await.unwrap();

        // Another device commits after our load
        backend.api().external_write(b"[]");
        let fetches_before = backend.api().fetches.load(Ordering::SeqCst);

        let projects = sample_projects();
        backend.save(&projects).await.unwrap();

        assert_eq!(backend.api().puts.load(Ordering::SeqCst), 2);
        assert_eq!(backend.api().fetches.load(Ordering::SeqCst), fetches_before + 1);
        assert_eq!(backend.load().await.unwrap(), projects);
    }

    #[tokio::test]
    async fn test_save_without_cached_token_uses_current_sha() {
        let api = MemoryFileApi::default();
        api.external_write(b"[]");
        // Never loaded, as after a startup timeout
        let backend = RemoteFileBackend::new(api);
        assert_eq!(backend.version(), None);

        let projects = sample_projects();
        backend.save(&projects).await.unwrap();

        assert_eq!(backend.api().puts.load(Ordering::SeqCst), 1);
        assert_eq!(backend.api().fetches.load(Ordering::SeqCst), 1);
        assert_eq!(backend.version().as_deref(), Some("sha-2"));
        assert_eq!(backend.load().await.unwrap(), projects);
    }

    #[test]
    fn test_missing_sha_rejection_counts_as_conflict() {
        assert!(is_conflict_status(StatusCode::CONFLICT));
        assert!(is_conflict_status(StatusCode::PRECONDITION_FAILED));
        assert!(is_conflict_status(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(!is_conflict_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_conflict_status(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_conflict_surfaces_when_retry_also_conflicts() {
        let api = MemoryFileApi::default();
        api.external_write(b"[]");
        api.racing_writers.store(2, Ordering::SeqCst);
        let backend = RemoteFileBackend::new(api);
        backend.load().await.unwrap();

        let result = backend.save(&sample_projects()).await;

        assert!(matches!(result, Err(Error::ConflictFailure(_))));
        assert_eq!(backend.api().puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_file_is_load_failure() {
        let api = MemoryFileApi::default();
        api.external_write(b"{\"projects\": 3}");
        let backend = RemoteFileBackend::new(api);
        assert!(matches!(backend.load().await, Err(Error::LoadFailure(_))));
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let encoded = BASE64.encode(b"[{\"id\":\"1\"}]");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{}\n{}\n", head, tail);
        assert_eq!(decode_content(&wrapped).unwrap(), b"[{\"id\":\"1\"}]".to_vec());
        assert!(decode_content("***").is_err());
    }

    #[test]
    fn test_put_request_omits_sha_on_create() {
        let body = PutContentsRequest {
            message: "create",
            content: BASE64.encode(b"[]"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["branch"], "main");
        assert_eq!(json["content"], "W10=");
    }

    #[test]
    fn test_github_api_url() {
        let config = RemoteFileConfig {
            owner: "octo".to_string(),
            repo: "boards".to_string(),
            path: "/data/projects.json".to_string(),
            ..RemoteFileConfig::default()
        };
        let api = GithubFileApi::new(&config, None).unwrap();
        assert_eq!(
            api.url(),
            "https://api.github.com/repos/octo/boards/contents/data/projects.json"
        );

        assert!(GithubFileApi::new(&RemoteFileConfig::default(), None).is_err());
    }
}
