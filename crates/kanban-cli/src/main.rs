//! Kanban CLI - personal project tracker

mod console;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use kanban_core::board::{Column, NewProject, Priority, Project, ProjectPatch, Stage};
use kanban_core::config::Config;
use kanban_core::controller::{BoardController, LoadSource};
use kanban_core::sync::{SaveOutcome, SyncStatus};
use serde::Serialize;
use tracing::warn;

#[derive(Parser)]
#[command(name = "kanban")]
#[command(author, version, about = "Personal kanban project tracker", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Add a project
    Add {
        /// Project title
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Low, Medium or High
        #[arg(short, long)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Starting stage (defaults to Wishlist)
        #[arg(short, long)]
        stage: Option<Stage>,
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Move a project to a stage
    Move { id: String, stage: Stage },

    /// Move a project to the next stage
    Next { id: String },

    /// Move a project to the previous stage
    Prev { id: String },

    /// Archive a project
    Archive { id: String },

    /// Delete a project
    Delete { id: String },

    /// Update project fields (an empty value clears a field)
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// Remove the priority
        #[arg(long, conflicts_with = "priority")]
        clear_priority: bool,
        #[arg(long)]
        due: Option<String>,
        /// Replace the tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Remove all tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },

    /// Set a project's notes (empty text clears them)
    Notes { id: String, text: String },

    /// List projects
    List {
        /// Only this stage
        #[arg(short, long)]
        stage: Option<Stage>,
    },

    /// Show project details
    Show { id: String },

    /// Show the board, one column per stage
    Board,

    /// Remove every project
    Clear {
        #[arg(long)]
        force: bool,
    },

    /// Show backend and sync status
    Status,

    /// Save the board to the remote backend now
    Sync,

    /// Reload the board from its backend, discarding unsent changes
    Refresh,

    /// Import projects from a JSON file (ids are kept, duplicates skipped)
    Import { file: PathBuf },

    /// Export projects as JSON
    Export {
        /// Output file (stdout when omitted)
        file: Option<PathBuf>,
    },

    /// Interactive console
    Console,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[derive(Clone, Copy)]
pub(crate) struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print a confirmation line unless quiet
    fn note(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("kanban=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),

        Commands::Console => {
            let mut controller = open_board(out).await?;
            console::run(&mut controller, out).await
        }

        command => {
            let mut controller = open_board(out).await?;
            let result = run_command(&mut controller, command, out).await;
            finish(&mut controller, out).await;
            result.map_err(with_hint)
        }
    }
}

/// Load configuration and the board, reporting a remote fallback
async fn open_board(out: Output) -> anyhow::Result<BoardController> {
    let config = Config::load()?;
    let mut controller =
        BoardController::from_config(&config).context("Failed to open the board")?;

    let report = controller.start().await;
    if report.source == LoadSource::LocalFallback
        && let Some(error) = &report.error
        && !out.quiet
    {
        eprintln!("Warning: {} backend unavailable, using local copy ({})", controller.backend_name(), error);
    }
    Ok(controller)
}

/// Write out anything still queued for the remote before exiting
async fn finish(controller: &mut BoardController, out: Output) {
    if let Err(e) = controller.shutdown().await {
        warn!(error = %e, "Remote sync failed on exit");
        if !out.quiet {
            eprintln!("Warning: changes are saved locally but not synced: {}", e);
        }
    }
}

/// Append the core error's suggestion unless the message already names it
pub(crate) fn with_hint(error: anyhow::Error) -> anyhow::Error {
    let Some(hint) = error
        .downcast_ref::<kanban_core::Error>()
        .and_then(|e| e.suggestion())
    else {
        return error;
    };
    let message = format!("{:#}", error);
    if message.contains(&hint) {
        return error;
    }
    anyhow!("{}\n\nHint: try `{}`", message, hint)
}

fn resolve_id(controller: &BoardController, id: &str) -> anyhow::Result<String> {
    Ok(controller.require(id)?.id.clone())
}

/// Run one board command against an open controller
pub(crate) async fn run_command(
    controller: &mut BoardController,
    command: Commands,
    out: Output,
) -> anyhow::Result<()> {
    match command {
        Commands::Add {
            title,
            description,
            priority,
            due,
            tags,
            stage,
            notes,
        } => {
            let input = NewProject {
                title,
                description,
                notes,
                priority,
                due_date: due,
                tags: tags.into_iter().collect(),
                stage: stage.unwrap_or_default(),
            };
            cmd_add(controller, input, out)
        }

        Commands::Move { id, stage } => cmd_move(controller, &id, stage, out),

        Commands::Next { id } => cmd_step(controller, &id, true, out),

        Commands::Prev { id } => cmd_step(controller, &id, false, out),

        Commands::Archive { id } => cmd_move(controller, &id, Stage::Archived, out),

        Commands::Delete { id } => cmd_delete(controller, &id, out),

        Commands::Update {
            id,
            title,
            description,
            priority,
            clear_priority,
            due,
            tags,
            clear_tags,
        } => {
            let patch = ProjectPatch {
                title,
                description,
                priority: if clear_priority { Some(None) } else { priority.map(Some) },
                due_date: due,
                tags: if clear_tags {
                    Some(BTreeSet::new())
                } else if tags.is_empty() {
                    None
                } else {
                    Some(tags.into_iter().collect())
                },
                ..ProjectPatch::default()
            };
            cmd_update(controller, &id, patch, out)
        }

        Commands::Notes { id, text } => cmd_notes(controller, &id, &text, out),

        Commands::List { stage } => cmd_list(controller, stage, out),

        Commands::Show { id } => cmd_show(controller, &id, out),

        Commands::Board => cmd_board(controller, out),

        Commands::Clear { force } => cmd_clear(controller, force, out),

        Commands::Status => cmd_status(controller, out),

        Commands::Sync => cmd_sync(controller, out).await,

        Commands::Refresh => cmd_refresh(controller, out).await,

        Commands::Import { file } => cmd_import(controller, &file, out),

        Commands::Export { file } => cmd_export(controller, file.as_deref(), out),

        Commands::Console | Commands::Config { .. } => {
            Err(anyhow!("This command is not available here"))
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn cmd_add(controller: &mut BoardController, input: NewProject, out: Output) -> anyhow::Result<()> {
    let id = controller.add(input)?;
    let project = controller.require(&id)?;

    if out.json() {
        return out.print_json(project);
    }
    out.note(format!("Project added: {}", project.title));
    out.note(format!("  ID: {}", project.id));
    out.note(format!("  Stage: {}", project.stage));
    Ok(())
}

fn cmd_move(controller: &mut BoardController, id: &str, stage: Stage, out: Output) -> anyhow::Result<()> {
    let id = resolve_id(controller, id)?;
    let moved = controller.move_to(&id, stage);
    let project = controller.require(&id)?;

    if out.json() {
        return out.print_json(project);
    }
    if moved {
        out.note(format!("Moved '{}' to {}.", project.title, stage));
    } else {
        out.note(format!("'{}' is already in {}.", project.title, stage));
    }
    Ok(())
}

fn cmd_step(controller: &mut BoardController, id: &str, forward: bool, out: Output) -> anyhow::Result<()> {
    let id = resolve_id(controller, id)?;
    let moved = if forward {
        controller.advance(&id)
    } else {
        controller.retreat(&id)
    };
    let project = controller.require(&id)?;

    if out.json() {
        return out.print_json(project);
    }
    match moved {
        Some(stage) => out.note(format!("Moved '{}' to {}.", project.title, stage)),
        None if forward => out.note(format!("'{}' is already at the last stage.", project.title)),
        None => out.note(format!("'{}' is already at the first stage.", project.title)),
    }
    Ok(())
}

fn cmd_delete(controller: &mut BoardController, id: &str, out: Output) -> anyhow::Result<()> {
    let project = controller.require(id)?.clone();
    controller.delete(&project.id);

    if out.json() {
        return out.print_json(&serde_json::json!({ "deleted": project.id }));
    }
    out.note(format!("Deleted '{}'.", project.title));
    Ok(())
}

fn cmd_update(
    controller: &mut BoardController,
    id: &str,
    patch: ProjectPatch,
    out: Output,
) -> anyhow::Result<()> {
    if patch.is_empty() {
        bail!("Nothing to update. Pass at least one field, e.g. --title or --priority.");
    }
    let id = resolve_id(controller, id)?;
    let changed = controller.update(&id, patch);
    let project = controller.require(&id)?;

    if out.json() {
        return out.print_json(project);
    }
    if changed {
        out.note(format!("Updated '{}'.", project.title));
    } else {
        out.note(format!("No changes to '{}'.", project.title));
    }
    Ok(())
}

fn cmd_notes(controller: &mut BoardController, id: &str, text: &str, out: Output) -> anyhow::Result<()> {
    let id = resolve_id(controller, id)?;
    controller.annotate(&id, text);
    let project = controller.require(&id)?;

    if out.json() {
        return out.print_json(project);
    }
    if project.has_notes() {
        out.note(format!("Notes saved for '{}'.", project.title));
    } else {
        out.note(format!("Notes cleared for '{}'.", project.title));
    }
    Ok(())
}

fn cmd_list(controller: &BoardController, stage: Option<Stage>, out: Output) -> anyhow::Result<()> {
    let projects = controller.list(stage);

    if out.json() {
        return out.print_json(&projects);
    }
    if projects.is_empty() {
        if !out.quiet {
            println!("No projects found.");
            println!("\nAdd one with: kanban add <title>");
        }
        return Ok(());
    }

    if !out.quiet {
        match stage {
            Some(stage) => println!("{} ({}):", stage, projects.len()),
            None => println!("Projects ({}):", projects.len()),
        }
    }
    for project in projects {
        println!("  {}", project_line(project, stage.is_none()));
    }
    Ok(())
}

fn cmd_show(controller: &BoardController, id: &str, out: Output) -> anyhow::Result<()> {
    let project = controller.require(id)?;

    if out.json() {
        return out.print_json(project);
    }
    println!("Project: {}", project.title);
    println!("  ID: {}", project.id);
    println!("  Stage: {} ({})", project.stage, project.stage.description());
    if let Some(priority) = project.priority {
        println!("  Priority: {}", priority);
    }
    if let Some(due) = &project.due_date {
        println!("  Due: {}", due);
    }
    if !project.tags.is_empty() {
        println!("  Tags: {}", join_tags(project));
    }
    if let Some(description) = &project.description {
        println!("  Description: {}", description);
    }
    if let Some(notes) = &project.notes {
        println!("  Notes: {}", notes);
    }
    println!(
        "  Created: {}",
        project.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated: {}",
        project.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );

    let targets: Vec<String> = [project.stage.prev(), project.stage.next()]
        .into_iter()
        .flatten()
        .map(|stage| stage.to_string())
        .collect();
    if !targets.is_empty() {
        println!("  Move to: {}", targets.join(", "));
    }
    Ok(())
}

fn cmd_board(controller: &BoardController, out: Output) -> anyhow::Result<()> {
    let columns = controller.columns();

    if out.json() {
        let value: Vec<_> = columns
            .iter()
            .map(|column| {
                serde_json::json!({
                    "stage": column.stage,
                    "description": column.stage.description(),
                    "projects": column.projects,
                })
            })
            .collect();
        return out.print_json(&value);
    }

    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_column(column);
    }
    Ok(())
}

fn print_column(column: &Column<'_>) {
    println!("{} ({}) - {}", column.stage, column.len(), column.stage.description());
    if column.is_empty() {
        println!("  (empty)");
    }
    for project in &column.projects {
        println!("  {}", project_line(project, false));
    }
}

fn cmd_clear(controller: &mut BoardController, force: bool, out: Output) -> anyhow::Result<()> {
    if !force {
        if !out.quiet {
            println!(
                "Warning: This will permanently delete all {} projects.",
                controller.store().len()
            );
            println!("Use --force to confirm.");
        }
        return Ok(());
    }

    let removed = controller.clear();
    if out.json() {
        return out.print_json(&serde_json::json!({ "removed": removed }));
    }
    out.note(format!("Removed {} projects.", removed));
    Ok(())
}

fn cmd_status(controller: &BoardController, out: Output) -> anyhow::Result<()> {
    let status = controller.sync_status();

    if out.json() {
        return out.print_json(&serde_json::json!({
            "backend": controller.backend_name(),
            "projects": controller.store().len(),
            "dataDir": controller.local().dir(),
            "sync": status,
        }));
    }
    println!("Backend: {}", controller.backend_name());
    println!("Projects: {}", controller.store().len());
    println!("Data dir: {}", controller.local().dir().display());
    println!("Sync: {}", status);
    Ok(())
}

async fn cmd_sync(controller: &mut BoardController, out: Output) -> anyhow::Result<()> {
    let outcome = controller.sync().await?;

    if out.json() {
        return out.print_json(&serde_json::json!({
            "backend": controller.backend_name(),
            "saved": outcome == SaveOutcome::Saved,
            "sync": controller.sync_status(),
        }));
    }
    match (controller.sync_status(), outcome) {
        (SyncStatus::LocalOnly, _) => {
            out.note("Saved locally (no remote backend configured).")
        }
        (_, SaveOutcome::Saved) => out.note(format!(
            "Synced {} projects to {}.",
            controller.store().len(),
            controller.backend_name()
        )),
        _ => out.note("Already up to date."),
    }
    Ok(())
}

async fn cmd_refresh(controller: &mut BoardController, out: Output) -> anyhow::Result<()> {
    let count = controller.refresh().await?;

    if out.json() {
        return out.print_json(&serde_json::json!({ "projects": count }));
    }
    out.note(format!("Reloaded {} projects from {}.", count, controller.backend_name()));
    Ok(())
}

/// Projects from an export file, a bare array or a `{ "projects": [...] }` document
fn read_import_file(path: &std::path::Path) -> anyhow::Result<Vec<Project>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    if let Some(projects) = value.get_mut("projects") {
        value = projects.take();
    }
    serde_json::from_value(value)
        .with_context(|| format!("{} does not contain a project list", path.display()))
}

fn cmd_import(controller: &mut BoardController, file: &std::path::Path, out: Output) -> anyhow::Result<()> {
    let projects = read_import_file(file)?;
    let total = projects.len();
    let added = controller.import(projects);

    if out.json() {
        return out.print_json(&serde_json::json!({ "imported": added, "skipped": total - added }));
    }
    out.note(format!(
        "Imported {} projects ({} already present).",
        added,
        total - added
    ));
    Ok(())
}

fn cmd_export(controller: &BoardController, file: Option<&std::path::Path>, out: Output) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(controller.store().projects())?;
    match file {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            out.note(format!(
                "Exported {} projects to {}.",
                controller.store().len(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            out.note(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.json() {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                return out.print_json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            out.note("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Formatting
// ============================================================================

fn join_tags(project: &Project) -> String {
    project
        .tags
        .iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn project_line(project: &Project, with_stage: bool) -> String {
    let mut line = format!("{}  ", project.short_id());
    if with_stage {
        line.push_str(&format!("{:<12} ", project.stage.as_str()));
    }
    line.push_str(&project.title);
    if let Some(priority) = project.priority {
        line.push_str(&format!(" [{}]", priority));
    }
    if let Some(due) = &project.due_date {
        line.push_str(&format!(" due {}", due));
    }
    if !project.tags.is_empty() {
        line.push(' ');
        line.push_str(&join_tags(project));
    }
    if project.has_notes() {
        line.push_str(" *");
    }
    line
}
