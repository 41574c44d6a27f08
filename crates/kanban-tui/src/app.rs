//! Board state and key handling
//!
//! The cursor addresses a card by column (stage) and row. Enter opens the
//! card in a detail modal backed by the controller's selection; every other
//! intent is dispatched straight to the controller. Forced syncs and reloads
//! run as spawned tasks whose results are picked up by [`App::tick`], so the
//! board keeps drawing while the network is slow.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use kanban_core::board::{NewProject, Project, Stage};
use kanban_core::controller::{BoardController, LoadReport, LoadSource};
use kanban_core::sync::SaveOutcome;
use tokio::sync::mpsc;
use tracing::debug;

/// What the keyboard is currently talking to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Board,
    Detail,
    EditNotes { id: String, input: String },
    AddProject { stage: Stage, input: String },
    ConfirmDelete { id: String },
}

/// What the event loop should do after a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Sync,
    Refresh,
}

/// Remote work currently running in the background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Busy {
    Syncing,
    Reloading,
}

impl Busy {
    fn label(self) -> &'static str {
        match self {
            Busy::Syncing => "Sync",
            Busy::Reloading => "Reload",
        }
    }
}

/// Result of a background task
#[derive(Debug)]
enum Completion {
    Synced(kanban_core::Result<SaveOutcome>),
    Reloaded(kanban_core::Result<Vec<Project>>),
}

pub struct App {
    controller: BoardController,
    column: usize,
    rows: [usize; Stage::ALL.len()],
    mode: Mode,
    message: Option<String>,
    busy: Option<Busy>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
}

impl App {
    pub fn new(controller: BoardController) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            column: 0,
            rows: [0; Stage::ALL.len()],
            mode: Mode::Board,
            message: None,
            busy: None,
            done_tx,
            done_rx,
        }
    }

    pub fn busy(&self) -> Option<Busy> {
        self.busy
    }

    pub fn controller(&self) -> &BoardController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut BoardController {
        &mut self.controller
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn row(&self, column: usize) -> usize {
        self.rows.get(column).copied().unwrap_or(0)
    }

    fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn on_loaded(&mut self, report: &LoadReport) {
        let message = match (report.source, &report.error) {
            (LoadSource::LocalFallback, Some(error)) => {
                format!("{} unavailable, using local copy: {}", self.controller.backend_name(), error)
            }
            (LoadSource::Empty, _) => "Board is empty. Press + to add a project.".to_string(),
            _ => format!("Loaded {} projects", report.count),
        };
        self.set_message(message);
    }

    /// Project under the cursor
    pub fn cursor_project(&self) -> Option<&Project> {
        let stage = Stage::ALL[self.column];
        self.controller
            .store()
            .by_stage(stage)
            .nth(self.row(self.column))
    }

    /// Project the current intent applies to
    fn target_id(&self) -> Option<String> {
        match self.mode {
            Mode::Detail => self.controller.selected().map(|p| p.id.clone()),
            _ => self.cursor_project().map(|p| p.id.clone()),
        }
    }

    fn column_len(&self, column: usize) -> usize {
        self.controller.store().by_stage(Stage::ALL[column]).count()
    }

    /// Keep every row index inside its column
    fn clamp_cursor(&mut self) {
        for column in 0..Stage::ALL.len() {
            let len = self.column_len(column);
            self.rows[column] = self.rows[column].min(len.saturating_sub(1));
        }
    }

    /// Apply finished background work and pushed remote updates; called once per frame
    pub fn tick(&mut self) {
        while let Ok(done) = self.done_rx.try_recv() {
            self.busy = None;
            match done {
                Completion::Synced(result) => self.on_sync(result),
                Completion::Reloaded(result) => {
                    let result = result.map(|projects| self.controller.finish_reload(projects));
                    self.on_refresh(result);
                }
            }
        }

        if self.controller.poll_remote() {
            self.clamp_cursor();
            if self.mode == Mode::Detail && self.controller.selected().is_none() {
                self.mode = Mode::Board;
            }
            self.set_message("Board updated from remote");
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match self.mode.clone() {
            Mode::Board => self.handle_board_key(key),
            Mode::Detail => self.handle_detail_key(key),
            Mode::EditNotes { id, input } => {
                self.handle_notes_key(key, id, input);
                Action::None
            }
            Mode::AddProject { stage, input } => {
                self.handle_add_key(key, stage, input);
                Action::None
            }
            Mode::ConfirmDelete { id } => {
                self.handle_confirm_key(key, &id);
                Action::None
            }
        }
    }

    fn handle_board_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('q') => return Action::Quit,
            KeyCode::Left | KeyCode::Char('h') => self.column = self.column.saturating_sub(1),
            KeyCode::Right | KeyCode::Char('l') => {
                self.column = (self.column + 1).min(Stage::ALL.len() - 1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.rows[self.column] = self.rows[self.column].saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let last = self.column_len(self.column).saturating_sub(1);
                self.rows[self.column] = (self.rows[self.column] + 1).min(last);
            }
            KeyCode::Enter => {
                if let Some(id) = self.target_id() {
                    self.controller.select(&id);
                    self.mode = Mode::Detail;
                }
            }
            KeyCode::Char('+') => {
                if !self.refuse_while_reloading() {
                    self.mode = Mode::AddProject {
                        stage: Stage::ALL[self.column],
                        input: String::new(),
                    };
                }
            }
            KeyCode::Char('s') => return Action::Sync,
            KeyCode::Char('r') => return Action::Refresh,
            _ => self.handle_card_key(key),
        }
        Action::None
    }

    fn handle_detail_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.controller.close_selection();
                self.mode = Mode::Board;
            }
            KeyCode::Char('q') => return Action::Quit,
            KeyCode::Char('s') => return Action::Sync,
            _ => self.handle_card_key(key),
        }
        Action::None
    }

    /// Keys acting on one card, shared by the board and the detail modal
    fn handle_card_key(&mut self, key: KeyEvent) {
        let Some(id) = self.target_id() else {
            return;
        };
        if self.refuse_while_reloading() {
            return;
        }

        match key.code {
            KeyCode::Char(']') => match self.controller.advance(&id) {
                Some(stage) => self.set_message(format!("Moved to {}", stage)),
                None => self.set_message("Already at the last stage"),
            },
            KeyCode::Char('[') => match self.controller.retreat(&id) {
                Some(stage) => self.set_message(format!("Moved to {}", stage)),
                None => self.set_message("Already at the first stage"),
            },
            KeyCode::Char('A') => {
                if self.controller.archive(&id) {
                    self.set_message("Archived");
                }
            }
            KeyCode::Char('D') => self.mode = Mode::ConfirmDelete { id },
            KeyCode::Char('n') => {
                let input = self
                    .controller
                    .get(&id)
                    .and_then(|p| p.notes.clone())
                    .unwrap_or_default();
                self.mode = Mode::EditNotes { id, input };
            }
            _ => {}
        }
        self.clamp_cursor();
    }

    /// Mode to return to once a modal input closes
    fn resting_mode(&self) -> Mode {
        if self.controller.selected().is_some() {
            Mode::Detail
        } else {
            Mode::Board
        }
    }

    fn handle_notes_key(&mut self, key: KeyEvent, id: String, mut input: String) {
        match key.code {
            KeyCode::Esc => self.mode = self.resting_mode(),
            KeyCode::Enter => {
                if self.controller.annotate(&id, input.trim()) {
                    self.set_message("Notes saved");
                }
                self.mode = self.resting_mode();
            }
            KeyCode::Backspace => {
                input.pop();
                self.mode = Mode::EditNotes { id, input };
            }
            KeyCode::Char(c) => {
                input.push(c);
                self.mode = Mode::EditNotes { id, input };
            }
            _ => {}
        }
    }

    fn handle_add_key(&mut self, key: KeyEvent, stage: Stage, mut input: String) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Board,
            KeyCode::Enter => {
                self.mode = Mode::Board;
                if input.trim().is_empty() {
                    return;
                }
                match self.controller.add(NewProject::new(input.trim()).with_stage(stage)) {
                    Ok(_) => {
                        self.column = stage.index();
                        self.rows[self.column] = self.column_len(self.column).saturating_sub(1);
                        self.set_message(format!("Added to {}", stage));
                    }
                    Err(e) => self.set_message(e.to_string()),
                }
            }
            KeyCode::Backspace => {
                input.pop();
                self.mode = Mode::AddProject { stage, input };
            }
            KeyCode::Char(c) => {
                input.push(c);
                self.mode = Mode::AddProject { stage, input };
            }
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent, id: &str) {
        if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) && self.controller.delete(id) {
            self.set_message("Deleted");
        }
        self.clamp_cursor();
        self.mode = self.resting_mode();
    }

    /// Edits made now would be overwritten by the reload in flight
    fn refuse_while_reloading(&mut self) -> bool {
        let reloading = self.busy == Some(Busy::Reloading);
        if reloading {
            self.set_message("Reload in progress");
        }
        reloading
    }

    fn refuse_while_busy(&mut self) -> bool {
        match self.busy {
            Some(busy) => {
                self.set_message(format!("{} already running", busy.label()));
                true
            }
            None => false,
        }
    }

    fn spawn_completion<F>(&mut self, busy: Busy, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            if done.send(task.await).is_err() {
                debug!("Board closed before background work finished");
            }
        });
        self.busy = Some(busy);
    }

    /// Force a save to the remote without waiting for it
    pub fn start_sync(&mut self) {
        if self.refuse_while_busy() {
            return;
        }
        match self.controller.prepare_sync() {
            Ok(Some(save)) => {
                self.spawn_completion(Busy::Syncing, async move { Completion::Synced(save.await) });
                self.set_message("Syncing...");
            }
            Ok(None) => self.on_sync(Ok(SaveOutcome::Saved)),
            Err(e) => self.on_sync(Err(e)),
        }
    }

    /// Reload the board from its source without waiting for the remote
    pub fn start_refresh(&mut self) {
        if self.refuse_while_busy() {
            return;
        }
        match self.controller.prepare_reload() {
            Some(load) => {
                self.spawn_completion(Busy::Reloading, async move { Completion::Reloaded(load.await) });
                self.set_message("Reloading...");
            }
            None => {
                let result = self
                    .controller
                    .local()
                    .read_projects()
                    .map(|projects| self.controller.finish_reload(projects));
                self.on_refresh(result);
            }
        }
    }

    fn on_sync(&mut self, result: kanban_core::Result<SaveOutcome>) {
        let message = match result {
            Ok(SaveOutcome::Saved) => format!("Synced to {}", self.controller.backend_name()),
            Ok(_) => "Already up to date".to_string(),
            Err(e) => format!("Sync failed: {}", e),
        };
        self.set_message(message);
    }

    fn on_refresh(&mut self, result: kanban_core::Result<usize>) {
        match result {
            Ok(count) => self.set_message(format!("Reloaded {} projects", count)),
            Err(e) => self.set_message(format!("Refresh failed: {}", e)),
        }
        self.clamp_cursor();
        if self.mode == Mode::Detail && self.controller.selected().is_none() {
            self.mode = Mode::Board;
        }
    }
}
