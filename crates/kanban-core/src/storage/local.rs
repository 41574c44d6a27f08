//! Local key-value store
//!
//! Each key maps to `<dir>/<key>.json`. Writes go to a temp file that is
//! then renamed over the target, so a crash never leaves a half-written
//! collection behind.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::StorageBackend;
use crate::board::Project;
use crate::error::{Error, Result};

/// Key holding the project collection
pub const PROJECTS_KEY: &str = "kanban-projects";

/// Key holding the cloud backend's reconnect cooldown
pub const COOLDOWN_KEY: &str = "kanban-cloud-cooldown";

/// Directory-backed key-value store
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(Error::InvalidInput(format!("invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Raw value stored under `key`
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the value stored under `key`
    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let tmp = path.with_extension("json.tmp");

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(key = %key, bytes = value.len(), "Wrote local key");
        Ok(())
    }

    /// Remove `key`, returning whether it existed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Typed value stored under `key`; malformed JSON is a load failure
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::LoadFailure(format!("local key '{}' is malformed: {}", key, e)))
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.set_raw(key, &json)
    }

    /// The cached project collection, empty when nothing was saved yet
    pub fn read_projects(&self) -> Result<Vec<Project>> {
        Ok(self.get::<Vec<Project>>(PROJECTS_KEY)?.unwrap_or_default())
    }

    pub fn write_projects(&self, projects: &[Project]) -> Result<()> {
        self.set(PROJECTS_KEY, projects)
    }
}

#[async_trait]
impl StorageBackend for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load(&self) -> Result<Vec<Project>> {
        self.read_projects()
    }

    async fn save(&self, projects: &[Project]) -> Result<()> {
        self.write_projects(projects)
    }
}
