//! In-memory project store
//!
//! The store is the authoritative collection. Mutators are synchronous and
//! total: an unknown id is a no-op reported as `false`, never an error.
//!
//! `move_to` only refreshes `updatedAt` when the stage actually changes;
//! `update` and `annotate` refresh it whenever a field changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::debug;

use super::project::{NewProject, Project, ProjectPatch, Stage};
use crate::error::{Error, Result};

/// Source of "now" for timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const ID_SUFFIX_LEN: usize = 6;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Ordered collection of projects with intent-driven mutators
pub struct ProjectStore {
    projects: Vec<Project>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectStore")
            .field("len", &self.projects.len())
            .finish()
    }
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore {
    /// Create an empty store on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            projects: Vec::new(),
            clock,
        }
    }

    /// Create a store seeded with an existing collection
    pub fn from_projects(projects: Vec<Project>) -> Self {
        let mut store = Self::new();
        store.replace_all(projects);
        store
    }

    /// Add a project, returning its freshly assigned id
    pub fn add(&mut self, input: NewProject) -> Result<String> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("project title cannot be blank".to_string()));
        }

        let now = self.clock.now();
        let id = self.generate_id(now);
        let project = Project {
            id: id.clone(),
            title: title.to_string(),
            description: non_blank(input.description),
            notes: non_blank(input.notes),
            priority: input.priority,
            due_date: non_blank(input.due_date),
            tags: input.tags,
            stage: input.stage,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %id, stage = %project.stage, "Project added");
        self.projects.push(project);
        Ok(id)
    }

    /// Move a project to `stage`
    pub fn move_to(&mut self, id: &str, stage: Stage) -> bool {
        let now = self.clock.now();
        let Some(project) = self.find_mut(id) else {
            debug!(id = %id, "Move ignored for unknown project");
            return false;
        };
        if project.stage == stage {
            return false;
        }
        project.stage = stage;
        touch(project, now);
        true
    }

    /// Move a project to the terminal Archived stage
    pub fn archive(&mut self, id: &str) -> bool {
        self.move_to(id, Stage::Archived)
    }

    /// Merge a partial update into a project
    pub fn update(&mut self, id: &str, patch: ProjectPatch) -> bool {
        let now = self.clock.now();
        let Some(project) = self.find_mut(id) else {
            debug!(id = %id, "Update ignored for unknown project");
            return false;
        };
        if !patch.apply(project) {
            return false;
        }
        touch(project, now);
        true
    }

    /// Replace a project's notes; empty text clears them
    pub fn annotate(&mut self, id: &str, notes: impl Into<String>) -> bool {
        self.update(
            id,
            ProjectPatch {
                notes: Some(notes.into()),
                ..Default::default()
            },
        )
    }

    /// Remove a project, returning whether one was removed
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        self.projects.len() != before
    }

    /// Projects in `stage`, in insertion order
    pub fn by_stage(&self, stage: Stage) -> impl Iterator<Item = &Project> + '_ {
        self.projects.iter().filter(move |p| p.stage == stage)
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Resolve an id or a unique id prefix
    pub fn resolve(&self, id_or_prefix: &str) -> Option<&Project> {
        if let Some(project) = self.get(id_or_prefix) {
            return Some(project);
        }
        let mut matches = self.projects.iter().filter(|p| p.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(project), None) if !id_or_prefix.is_empty() => Some(project),
            _ => None,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Owned copy of the collection, as handed to persistence
    pub fn snapshot(&self) -> Vec<Project> {
        self.projects.clone()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn clear(&mut self) {
        self.projects.clear();
    }

    /// Replace the whole collection, dropping later duplicates of an id
    pub fn replace_all(&mut self, projects: Vec<Project>) {
        let mut seen = std::collections::HashSet::new();
        self.projects = projects
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();
    }

    /// Append an existing record unless its id is already present
    pub fn insert(&mut self, project: Project) -> bool {
        if self.get(&project.id).is_some() {
            return false;
        }
        self.projects.push(project);
        true
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    fn generate_id(&self, now: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..ID_SUFFIX_LEN)
                .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
                .collect();
            let id = format!("{}-{}", now.timestamp_millis(), suffix);
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

fn touch(project: &mut Project, now: DateTime<Utc>) {
    project.updated_at = now.max(project.created_at);
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Mutex;

    /// Clock that advances one second per reading
    pub(crate) struct SteppingClock(Mutex<DateTime<Utc>>);

    impl SteppingClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                DateTime::parse_from_rfc3339("2026-02-02T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            )))
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut now = self.0.lock().unwrap();
            *now += TimeDelta::seconds(1);
            *now
        }
    }

    fn store() -> ProjectStore {
        ProjectStore::with_clock(SteppingClock::new())
    }

    #[test]
    fn test_add_assigns_unique_ids_and_equal_timestamps() {
        let mut store = store();
        let mut ids = std::collections::HashSet::new();
        for i in 0..50 {
            let id = store.add(NewProject::new(format!("P{}", i))).unwrap();
            let project = store.get(&id).unwrap();
            assert_eq!(project.created_at, project.updated_at);
            assert!(ids.insert(id));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_add_rejects_blank_title() {
        let mut store = store();
        assert!(matches!(
            store.add(NewProject::new("  ")),
            Err(Error::InvalidInput(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_then_move_scenario() {
        let mut store = store();
        let id = store
            .add(NewProject::new("A").with_stage(Stage::Wishlist))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.by_stage(Stage::Wishlist).count(), 1);
        assert_eq!(store.by_stage(Stage::Finished).count(), 0);

        let before = store.get(&id).unwrap().clone();
        assert!(store.move_to(&id, Stage::Finished));

        assert_eq!(store.by_stage(Stage::Wishlist).count(), 0);
        let moved: Vec<_> = store.by_stage(Stage::Finished).collect();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, id);
        assert!(moved[0].updated_at > before.updated_at);
        assert_eq!(moved[0].created_at, before.created_at);
    }

    #[test]
    fn test_repeated_move_to_same_stage_is_untouched() {
        let mut store = store();
        let id = store.add(NewProject::new("A")).unwrap();

        assert!(store.move_to(&id, Stage::InProgress));
        let after_first = store.get(&id).unwrap().clone();

        assert!(!store.move_to(&id, Stage::InProgress));
        let after_second = store.get(&id).unwrap();
        assert_eq!(after_second.stage, Stage::InProgress);
        assert_eq!(after_second.updated_at, after_first.updated_at);
    }

    #[test]
    fn test_mutations_on_unknown_id_are_noops() {
        let mut store = store();
        store.add(NewProject::new("A")).unwrap();
        let before = store.snapshot();

        assert!(!store.move_to("missing", Stage::Finished));
        assert!(!store.archive("missing"));
        assert!(!store.annotate("missing", "note"));
        assert!(!store.update(
            "missing",
            ProjectPatch {
                title: Some("B".to_string()),
                ..Default::default()
            }
        ));
        assert!(!store.delete("missing"));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_update_merges_and_keeps_identity() {
        let mut store = store();
        let id = store
            .add(NewProject::new("A").with_description("old").with_tags(["x"]))
            .unwrap();
        let created_at = store.get(&id).unwrap().created_at;

        let changed = store.update(
            &id,
            ProjectPatch {
                title: Some("Renamed".to_string()),
                tags: Some(["y".to_string(), "z".to_string()].into()),
                ..Default::default()
            },
        );

        assert!(changed);
        let project = store.get(&id).unwrap();
        assert_eq!(project.id, id);
        assert_eq!(project.title, "Renamed");
        assert_eq!(project.description.as_deref(), Some("old"));
        assert_eq!(project.tags.len(), 2);
        assert_eq!(project.created_at, created_at);
        assert!(project.updated_at > created_at);
    }

    #[test]
    fn test_annotate_sets_and_clears_notes() {
        let mut store = store();
        let id = store.add(NewProject::new("A")).unwrap();

        assert!(store.annotate(&id, "call the vendor"));
        assert!(store.get(&id).unwrap().has_notes());

        assert!(store.annotate(&id, ""));
        assert_eq!(store.get(&id).unwrap().notes, None);
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let mut store = store();
        let a = store.add(NewProject::new("A")).unwrap();
        store.add(NewProject::new("B")).unwrap();

        assert!(store.delete(&a));
        assert_eq!(store.len(), 1);
        assert!(!store.delete(&a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_archive_moves_to_archived() {
        let mut store = store();
        let id = store.add(NewProject::new("A")).unwrap();
        assert!(store.archive(&id));
        assert_eq!(store.get(&id).unwrap().stage, Stage::Archived);
    }

    #[test]
    fn test_by_stage_reflects_current_state() {
        let mut store = store();
        let a = store.add(NewProject::new("A")).unwrap();
        let b = store.add(NewProject::new("B")).unwrap();
        store.move_to(&b, Stage::InProgress);

        let wishlist: Vec<_> = store.by_stage(Stage::Wishlist).map(|p| p.id.clone()).collect();
        assert_eq!(wishlist, vec![a.clone()]);

        store.move_to(&a, Stage::InProgress);
        let in_progress: Vec<_> = store
            .by_stage(Stage::InProgress)
            .map(|p| p.id.clone())
            .collect();
        assert_eq!(in_progress, vec![a, b]);
    }

    #[test]
    fn test_resolve_by_prefix() {
        let mut store = store();
        store.replace_all(vec![
            serde_json::from_str(r#"{"id":"abc-1","title":"A","stage":"Wishlist"}"#).unwrap(),
            serde_json::from_str(r#"{"id":"abd-2","title":"B","stage":"Wishlist"}"#).unwrap(),
        ]);

        assert_eq!(store.resolve("abc").map(|p| p.title.as_str()), Some("A"));
        assert!(store.resolve("ab").is_none());
        assert!(store.resolve("").is_none());
        assert_eq!(store.resolve("abd-2").map(|p| p.title.as_str()), Some("B"));
    }

    #[test]
    fn test_replace_all_drops_duplicate_ids() {
        let mut store = store();
        store.replace_all(vec![
            serde_json::from_str(r#"{"id":"1","title":"first","stage":"Wishlist"}"#).unwrap(),
            serde_json::from_str(r#"{"id":"1","title":"second","stage":"Wishlist"}"#).unwrap(),
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().title, "first");
    }
}
