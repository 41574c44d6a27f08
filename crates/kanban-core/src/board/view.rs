//! Board projection and single-project selection

use super::project::{Project, Stage};
use super::store::ProjectStore;

/// One stage column of the board
#[derive(Debug, Clone)]
pub struct Column<'a> {
    pub stage: Stage,
    pub projects: Vec<&'a Project>,
}

impl Column<'_> {
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// Group the store into one column per stage, in pipeline order
pub fn columns(store: &ProjectStore) -> Vec<Column<'_>> {
    Stage::ALL
        .iter()
        .map(|&stage| Column {
            stage,
            projects: store.by_stage(stage).collect(),
        })
        .collect()
}

/// At most one selected project, held by id so it always reads fresh state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
    }

    pub fn close(&mut self) {
        self.selected = None;
    }

    pub fn id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.as_deref() == Some(id)
    }

    /// The selected project as currently stored
    pub fn project<'a>(&self, store: &'a ProjectStore) -> Option<&'a Project> {
        self.selected.as_deref().and_then(|id| store.get(id))
    }

    /// Clear the selection if it refers to `id`
    pub fn on_deleted(&mut self, id: &str) {
        if self.is_selected(id) {
            self.selected = None;
        }
    }

    /// Drop a selection whose project no longer exists
    pub fn retain_existing(&mut self, store: &ProjectStore) {
        if let Some(id) = &self.selected
            && store.get(id).is_none()
        {
            self.selected = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::project::{NewProject, ProjectPatch};

    #[test]
    fn test_columns_follow_pipeline_order() {
        let mut store = ProjectStore::new();
        store.add(NewProject::new("A").with_stage(Stage::Finished)).unwrap();
        store.add(NewProject::new("B")).unwrap();

        let cols = columns(&store);
        let stages: Vec<_> = cols.iter().map(|c| c.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert_eq!(cols[0].len(), 1);
        assert!(cols[1].is_empty());
        assert_eq!(cols[2].projects[0].title, "A");
    }

    #[test]
    fn test_selection_tracks_updates() {
        let mut store = ProjectStore::new();
        let id = store.add(NewProject::new("A")).unwrap();
        let mut selection = Selection::new();
        selection.select(&id);

        store.update(
            &id,
            ProjectPatch {
                title: Some("B".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(selection.project(&store).unwrap().title, "B");
    }

    #[test]
    fn test_selection_cleared_on_delete_of_selected_only() {
        let mut selection = Selection::new();
        selection.select("a");

        selection.on_deleted("b");
        assert_eq!(selection.id(), Some("a"));

        selection.on_deleted("a");
        assert_eq!(selection.id(), None);
    }

    #[test]
    fn test_retain_existing() {
        let store = ProjectStore::new();
        let mut selection = Selection::new();
        selection.select("gone");
        selection.retain_existing(&store);
        assert_eq!(selection.id(), None);
    }
}
