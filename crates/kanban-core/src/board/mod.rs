//! Board domain - projects, the in-memory store, and the board projection

pub mod project;
pub mod store;
pub mod view;

pub use project::{NewProject, Priority, Project, ProjectPatch, Stage};
pub use store::{Clock, ProjectStore, SystemClock};
pub use view::{Column, Selection, columns};
