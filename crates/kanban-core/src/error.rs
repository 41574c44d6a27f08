//! Error types for Kanban

use thiserror::Error;

/// Result type alias using Kanban's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Kanban error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Project '{0}' not found. Run `kanban list` to see all projects.")]
    ProjectNotFound(String),

    #[error("Unknown stage '{0}'. Valid stages: Wishlist, In Progress, Finished, Archived.")]
    UnknownStage(String),

    // Sync errors (E100-E199)
    #[error("Failed to load projects: {0}")]
    LoadFailure(String),

    #[error("Failed to save projects: {0}")]
    SaveFailure(String),

    #[error("Remote file changed concurrently and the retry also conflicted: {0}")]
    ConflictFailure(String),

    #[error("Cloud backend is cooling down after a failed connection. Retry after {0}.")]
    CoolingDown(String),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("Timed out after {0} seconds waiting for the storage backend.")]
    Timeout(u64),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProjectNotFound(_) => "E001",
            Self::UnknownStage(_) => "E002",
            Self::LoadFailure(_) => "E100",
            Self::SaveFailure(_) => "E101",
            Self::ConflictFailure(_) => "E102",
            Self::CoolingDown(_) => "E103",
            Self::NetworkError(_) => "E104",
            Self::Timeout(_) => "E105",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Json(_) => "E801",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ProjectNotFound(_) => Some("kanban list".to_string()),
            Self::UnknownStage(_) => Some("kanban board".to_string()),
            Self::SaveFailure(_) | Self::Timeout(_) => Some("kanban sync".to_string()),
            Self::ConflictFailure(_) => Some("kanban refresh".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::ConfigError(_) => Some("kanban config list".to_string()),
            _ => None,
        }
    }

    /// Whether a later manual or scheduled attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SaveFailure(_)
                | Self::ConflictFailure(_)
                | Self::CoolingDown(_)
                | Self::NetworkError(_)
                | Self::Timeout(_)
        )
    }
}
