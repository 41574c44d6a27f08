//! Kanban TUI - interactive board
//!
//! Shows the four stage columns side by side with a detail modal per card.
//! Edits are written locally at once and pushed to the configured remote in
//! the background; pushed remote changes are applied between frames.

mod app;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use kanban_core::{config::Config, controller::BoardController};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::{Action, App};

const LOG_FILE: &str = "kanban-tui.log";
const TICK: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    let data_dir = config.storage.resolved_data_dir()?;
    init_logging(&data_dir)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    // Debounce timers and background syncs are spawned from the UI thread
    let _guard = runtime.enter();

    let mut controller = BoardController::from_config(&config)?;
    let report = runtime.block_on(controller.start());
    info!(source = ?report.source, count = report.count, "Board loaded");
    controller.watch_remote();

    let mut app = App::new(controller);
    app.on_loaded(&report);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = runtime.block_on(app.controller_mut().shutdown()) {
        warn!(error = %e, "Final sync failed");
        eprintln!("Warning: final sync failed: {}", e);
    }

    result
}

/// Log to a file so output never lands on the alternate screen
fn init_logging(data_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kanban=info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        app.tick();
        terminal.draw(|frame| ui::render(frame, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.handle_key(key) {
            Action::None => {}
            Action::Quit => return Ok(()),
            Action::Sync => app.start_sync(),
            Action::Refresh => app.start_refresh(),
        }
    }
}

