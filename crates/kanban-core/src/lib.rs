//! Kanban Core Library
//!
//! This crate provides the core functionality for the kanban tracker, including:
//! - Board model (projects, stages, the project store and column views)
//! - Storage backends (local key-value store, cloud document, remote file)
//! - Sync engine (debounced, coalescing remote writes with status reporting)
//! - Board controller (the single entry point used by the CLI and TUI)
//! - Configuration (TOML file with environment-only secrets)

pub mod board;
pub mod config;
pub mod controller;
pub mod error;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::{NewProject, Priority, Project, ProjectPatch, ProjectStore, Stage};
    pub use crate::config::{BackendKind, Config};
    pub use crate::controller::{BoardController, LoadReport, LoadSource};
    pub use crate::error::{Error, Result};
    pub use crate::sync::{SaveOutcome, SyncStatus};
}
