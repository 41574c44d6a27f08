//! Project records and the stage pipeline
//!
//! The JSON shape of [`Project`] is the persisted format shared by every
//! storage backend: camelCase keys, stages by display name, tags as a
//! sorted array.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A pipeline stage a project occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    #[serde(rename = "Wishlist", alias = "Backlog")]
    Wishlist,
    #[serde(rename = "In Progress", alias = "Review")]
    InProgress,
    #[serde(rename = "Finished", alias = "Done")]
    Finished,
    #[serde(rename = "Archived")]
    Archived,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 4] = [
        Stage::Wishlist,
        Stage::InProgress,
        Stage::Finished,
        Stage::Archived,
    ];

    /// Display name, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Wishlist => "Wishlist",
            Stage::InProgress => "In Progress",
            Stage::Finished => "Finished",
            Stage::Archived => "Archived",
        }
    }

    /// Short column caption
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Wishlist => "Future ideas",
            Stage::InProgress => "Active work",
            Stage::Finished => "Completed",
            Stage::Archived => "Past work",
        }
    }

    /// Position in the pipeline
    pub fn index(&self) -> usize {
        match self {
            Stage::Wishlist => 0,
            Stage::InProgress => 1,
            Stage::Finished => 2,
            Stage::Archived => 3,
        }
    }

    /// The following stage, or `None` for the terminal stage
    pub fn next(&self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// The preceding stage, or `None` for the first stage
    pub fn prev(&self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    /// Parse user-entered text, tolerating case, separators and legacy names
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "wishlist" | "backlog" => Some(Stage::Wishlist),
            "inprogress" | "review" => Some(Stage::InProgress),
            "finished" | "done" => Some(Stage::Finished),
            "archived" => Some(Stage::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::parse(s).ok_or_else(|| Error::UnknownStage(s.to_string()))
    }
}

/// Project priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" | "med" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Priority::parse(s).ok_or_else(|| {
            Error::InvalidInput(format!("unknown priority '{}' (expected Low, Medium or High)", s))
        })
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// A tracked work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Opaque unique identifier, immutable
    pub id: String,
    /// Display name, never blank
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Free-form date string, usually `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub stage: Stage,
    /// Set once at creation
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    /// Refreshed by every mutation
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether the project carries non-empty notes
    pub fn has_notes(&self) -> bool {
        self.notes.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Short id prefix for listings
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// Input for creating a project; id and timestamps are assigned by the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub stage: Stage,
}

impl NewProject {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Partial update merged into an existing project
///
/// Text fields set to an empty string clear the field. `id` and
/// `createdAt` are not part of the patch and can never change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<Option<Priority>>,
    pub due_date: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub stage: Option<Stage>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        *self == ProjectPatch::default()
    }

    /// Merge into `project`, returning whether any field changed
    pub(crate) fn apply(self, project: &mut Project) -> bool {
        let mut changed = false;

        if let Some(title) = self.title {
            let title = title.trim().to_string();
            if !title.is_empty() && title != project.title {
                project.title = title;
                changed = true;
            }
        }
        changed |= merge_text(&mut project.description, self.description);
        changed |= merge_text(&mut project.notes, self.notes);
        changed |= merge_text(&mut project.due_date, self.due_date);
        if let Some(priority) = self.priority
            && priority != project.priority
        {
            project.priority = priority;
            changed = true;
        }
        if let Some(tags) = self.tags
            && tags != project.tags
        {
            project.tags = tags;
            changed = true;
        }
        if let Some(stage) = self.stage
            && stage != project.stage
        {
            project.stage = stage;
            changed = true;
        }

        changed
    }
}

fn merge_text(field: &mut Option<String>, value: Option<String>) -> bool {
    let Some(value) = value else {
        return false;
    };
    let next = if value.trim().is_empty() { None } else { Some(value) };
    if *field == next {
        return false;
    }
    *field = next;
    true
}
