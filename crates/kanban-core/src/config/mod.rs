//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Kanban configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cloud: CloudConfig,
    pub remote_file: RemoteFileConfig,
}

/// Which persistence backend syncs the board, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Cloud,
    RemoteFile,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
            BackendKind::RemoteFile => "remote_file",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local" => Ok(BackendKind::Local),
            "cloud" => Ok(BackendKind::Cloud),
            "remote_file" | "github" => Ok(BackendKind::RemoteFile),
            other => Err(anyhow!(
                "Invalid storage backend: {}. Valid options: local, cloud, remote_file",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Directory for the local store; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,
    pub load_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    #[serde(skip)]
    pub token: Option<String>,
    pub base_url: String,
    pub document_path: String,
    pub debounce_ms: u64,
    pub cooldown_secs: u64,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteFileConfig {
    #[serde(skip)]
    pub token: Option<String>,
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub branch: String,
    pub debounce_secs: u64,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            data_dir: None,
            load_timeout_secs: 5,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: String::new(),
            document_path: "kanban/projects".to_string(),
            debounce_ms: 2_000,
            cooldown_secs: 300,
            poll_interval_secs: 10,
            timeout_secs: 15,
        }
    }
}

impl Default for RemoteFileConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            path: "data/projects.json".to_string(),
            branch: "main".to_string(),
            debounce_secs: 30,
            timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    /// Directory holding the local key-value store
    pub fn resolved_data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        if let Ok(custom_dir) = env::var("KANBAN_DATA_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("kanban"))
    }
}

impl CloudConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn resolved_token(&self) -> anyhow::Result<Option<String>> {
        enforce_env_only(self.token.as_deref())?;
        Ok(env::var("KANBAN_CLOUD_TOKEN").ok())
    }
}

impl RemoteFileConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn resolved_token(&self) -> anyhow::Result<Option<String>> {
        enforce_env_only(self.token.as_deref())?;
        Ok(env::var("KANBAN_GITHUB_TOKEN")
            .or_else(|_| env::var("GITHUB_TOKEN"))
            .ok())
    }
}

fn enforce_env_only(token: Option<&str>) -> anyhow::Result<()> {
    if token.is_some() {
        return Err(anyhow!(
            "Access tokens must be provided via environment variables, not stored in configuration"
        ));
    }
    Ok(())
}

fn redact(token: Option<String>, env_hint: &str) -> String {
    match token {
        Some(key) if key.chars().count() > 4 => {
            let cut = key.char_indices().rev().nth(3).map_or(0, |(i, _)| i);
            format!("***{}", &key[cut..])
        }
        Some(_) => "***".to_string(),
        None => format!("(not set - use {} env var)", env_hint),
    }
}

fn parse_u64(key: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn parse_positive(key: &str, value: &str) -> anyhow::Result<u64> {
    let parsed = parse_u64(key, value)?;
    if parsed == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KANBAN_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("kanban")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        enforce_env_only(self.cloud.token.as_deref())?;
        enforce_env_only(self.remote_file.token.as_deref())?;

        match self.storage.backend {
            BackendKind::Local => {}
            BackendKind::Cloud => {
                if self.cloud.base_url.trim().is_empty() {
                    return Err(anyhow!(
                        "cloud.base_url must be set when storage.backend = \"cloud\""
                    ));
                }
            }
            BackendKind::RemoteFile => {
                if self.remote_file.owner.trim().is_empty()
                    || self.remote_file.repo.trim().is_empty()
                {
                    return Err(anyhow!(
                        "remote_file.owner and remote_file.repo must be set when storage.backend = \"remote_file\""
                    ));
                }
            }
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Storage settings
            "storage.backend" => Ok(self.storage.backend.to_string()),
            "storage.data_dir" => Ok(self
                .storage
                .resolved_data_dir()?
                .display()
                .to_string()),
            "storage.load_timeout_secs" => Ok(self.storage.load_timeout_secs.to_string()),

            // Cloud document settings
            "cloud.base_url" => Ok(self.cloud.base_url.clone()),
            "cloud.document_path" => Ok(self.cloud.document_path.clone()),
            "cloud.debounce_ms" => Ok(self.cloud.debounce_ms.to_string()),
            "cloud.cooldown_secs" => Ok(self.cloud.cooldown_secs.to_string()),
            "cloud.poll_interval_secs" => Ok(self.cloud.poll_interval_secs.to_string()),
            "cloud.timeout_secs" => Ok(self.cloud.timeout_secs.to_string()),
            "cloud.token" => Ok(redact(self.cloud.resolved_token()?, "KANBAN_CLOUD_TOKEN")),

            // Remote file settings
            "remote_file.api_base" => Ok(self.remote_file.api_base.clone()),
            "remote_file.owner" => Ok(self.remote_file.owner.clone()),
            "remote_file.repo" => Ok(self.remote_file.repo.clone()),
            "remote_file.path" => Ok(self.remote_file.path.clone()),
            "remote_file.branch" => Ok(self.remote_file.branch.clone()),
            "remote_file.debounce_secs" => Ok(self.remote_file.debounce_secs.to_string()),
            "remote_file.timeout_secs" => Ok(self.remote_file.timeout_secs.to_string()),
            "remote_file.token" => Ok(redact(
                self.remote_file.resolved_token()?,
                "KANBAN_GITHUB_TOKEN or GITHUB_TOKEN",
            )),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `kanban config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.backend" => self.storage.backend = value.parse()?,
            "storage.data_dir" => {
                self.storage.data_dir = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "storage.load_timeout_secs" => {
                self.storage.load_timeout_secs = parse_positive(key, value)?;
            }

            "cloud.base_url" => {
                let url = value.trim().trim_end_matches('/');
                if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(anyhow!("cloud.base_url must start with http:// or https://"));
                }
                self.cloud.base_url = url.to_string();
            }
            "cloud.document_path" => {
                let path = value.trim().trim_matches('/');
                if path.is_empty() {
                    return Err(anyhow!("cloud.document_path cannot be empty"));
                }
                self.cloud.document_path = path.to_string();
            }
            "cloud.debounce_ms" => self.cloud.debounce_ms = parse_u64(key, value)?,
            "cloud.cooldown_secs" => self.cloud.cooldown_secs = parse_u64(key, value)?,
            "cloud.poll_interval_secs" => {
                self.cloud.poll_interval_secs = parse_positive(key, value)?;
            }
            "cloud.timeout_secs" => self.cloud.timeout_secs = parse_positive(key, value)?,

            "remote_file.api_base" => {
                self.remote_file.api_base = value.trim().trim_end_matches('/').to_string();
            }
            "remote_file.owner" => self.remote_file.owner = value.trim().to_string(),
            "remote_file.repo" => self.remote_file.repo = value.trim().to_string(),
            "remote_file.path" => {
                let path = value.trim().trim_matches('/');
                if path.is_empty() {
                    return Err(anyhow!("remote_file.path cannot be empty"));
                }
                self.remote_file.path = path.to_string();
            }
            "remote_file.branch" => self.remote_file.branch = value.trim().to_string(),
            "remote_file.debounce_secs" => {
                self.remote_file.debounce_secs = parse_u64(key, value)?;
            }
            "remote_file.timeout_secs" => {
                self.remote_file.timeout_secs = parse_positive(key, value)?;
            }

            // Tokens cannot be set via config
            "cloud.token" | "remote_file.token" => {
                return Err(anyhow!(
                    "Access tokens cannot be stored in configuration for security. \
                     Set KANBAN_CLOUD_TOKEN or KANBAN_GITHUB_TOKEN in the environment instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `kanban config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "storage.backend",
            "storage.data_dir",
            "storage.load_timeout_secs",
            "cloud.base_url",
            "cloud.document_path",
            "cloud.debounce_ms",
            "cloud.cooldown_secs",
            "cloud.poll_interval_secs",
            "cloud.timeout_secs",
            "cloud.token",
            "remote_file.api_base",
            "remote_file.owner",
            "remote_file.repo",
            "remote_file.path",
            "remote_file.branch",
            "remote_file.debounce_secs",
            "remote_file.timeout_secs",
            "remote_file.token",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.storage.backend, BackendKind::Local);
        assert_eq!(config.storage.load_timeout_secs, 5);
        assert_eq!(config.cloud.debounce_ms, 2_000);
        assert_eq!(config.cloud.cooldown_secs, 300);
        assert_eq!(config.remote_file.debounce_secs, 30);
        assert_eq!(config.remote_file.branch, "main");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "remote_file"

            [remote_file]
            owner = "octo"
            repo = "boards"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, BackendKind::RemoteFile);
        assert_eq!(config.storage.load_timeout_secs, 5);
        assert_eq!(config.remote_file.path, "data/projects.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_backend_settings() {
        let mut config = Config::default();
        config.storage.backend = BackendKind::Cloud;
        assert!(config.validate().is_err());

        config.cloud.base_url = "https://docs.example.com".to_string();
        assert!(config.validate().is_ok());

        config.storage.backend = BackendKind::RemoteFile;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tokens_cannot_be_stored() {
        let mut config = Config::default();
        assert!(config.set("cloud.token", "secret").is_err());
        assert!(config.set("remote_file.token", "secret").is_err());

        config.remote_file.token = Some("secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redact_keeps_last_four_characters() {
        assert_eq!(redact(Some("ghp_abcdef1234".to_string()), "X"), "***1234");
        assert_eq!(redact(Some("tokençé€ü".to_string()), "X"), "***çé€ü");
        assert_eq!(redact(Some("€€€".to_string()), "X"), "***");
        assert!(redact(None, "KANBAN_CLOUD_TOKEN").contains("KANBAN_CLOUD_TOKEN"));
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let mut config = Config::default();
        config.set("storage.backend", "remote-file").unwrap();
        config.set("remote_file.owner", "octo").unwrap();
        config.set("cloud.base_url", "https://docs.example.com/").unwrap();
        config.set("cloud.debounce_ms", "500").unwrap();

        assert_eq!(config.get("storage.backend").unwrap(), "remote_file");
        assert_eq!(config.get("remote_file.owner").unwrap(), "octo");
        assert_eq!(config.get("cloud.base_url").unwrap(), "https://docs.example.com");
        assert_eq!(config.cloud.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("storage.backend", "ftp").is_err());
        assert!(config.set("storage.load_timeout_secs", "0").is_err());
        assert!(config.set("cloud.debounce_ms", "soon").is_err());
        assert!(config.set("cloud.base_url", "ftp://x").is_err());
        assert!(config.set("remote_file.path", "/").is_err());
        assert!(config.set("nope", "1").is_err());
    }

    #[test]
    fn test_list_contains_every_section() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/kanban-test"));
        let items = config.list().unwrap();
        assert!(items.iter().any(|(k, _)| k == "storage.backend"));
        assert!(items.iter().any(|(k, _)| k == "cloud.debounce_ms"));
        assert!(items.iter().any(|(k, _)| k == "remote_file.branch"));
        assert!(
            items
                .iter()
                .any(|(k, v)| k == "storage.data_dir" && v == "/tmp/kanban-test")
        );
    }

    #[test]
    fn test_toml_roundtrip_skips_tokens() {
        let mut config = Config::default();
        config.cloud.base_url = "https://docs.example.com".to_string();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("token"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.cloud.base_url, "https://docs.example.com");
    }
}
