//! Interactive console
//!
//! One long-lived controller serves every line, so debounced writes and
//! pushed remote updates behave as they do in the TUI. Lines are parsed with
//! the same clap definition as the command line.

use clap::Parser;
use kanban_core::controller::BoardController;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::{Cli, Commands, Output, cmd_config, run_command, with_hint};

const HISTORY_FILE: &str = "console_history.txt";

pub(crate) async fn run(controller: &mut BoardController, out: Output) -> anyhow::Result<()> {
    let watching = controller.watch_remote();
    let mut editor = DefaultEditor::new()?;
    let history = controller.local().dir().join(HISTORY_FILE);
    if editor.load_history(&history).is_err() {
        debug!(path = %history.display(), "No console history yet");
    }

    if !out.quiet {
        println!(
            "Kanban console ({} backend, {} projects{})",
            controller.backend_name(),
            controller.store().len(),
            if watching { ", live updates on" } else { "" }
        );
        println!("Type `help` for commands, `quit` to exit.");
    }

    loop {
        if controller.poll_remote() && !out.quiet {
            println!("(board updated from remote: {} projects)", controller.store().len());
        }

        let line = match tokio::task::block_in_place(|| editor.readline("kanban> ")) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if editor.add_history_entry(line).is_err() {
            debug!("Failed to record console history entry");
        }
        if matches!(line, "quit" | "exit" | "q") {
            break;
        }

        let tokens = match split_line(line) {
            Ok(tokens) => tokens,
            Err(message) => {
                eprintln!("Error: {}", message);
                continue;
            }
        };

        let cli = match Cli::try_parse_from(std::iter::once("kanban".to_string()).chain(tokens)) {
            Ok(cli) => cli,
            Err(e) => {
                // Also prints `help` and `--version` output
                if let Err(io_error) = e.print() {
                    debug!(error = %io_error, "Failed to print console parse error");
                }
                continue;
            }
        };
        let line_out = Output {
            format: cli.format,
            quiet: cli.quiet || out.quiet,
        };

        let result = match cli.command {
            Commands::Console => {
                println!("Already in the console.");
                Ok(())
            }
            Commands::Config { action } => cmd_config(action, line_out),
            command => run_command(controller, command, line_out).await,
        };
        if let Err(e) = result {
            eprintln!("Error: {:#}", with_hint(e));
        }
    }

    if let Err(e) = editor.save_history(&history) {
        debug!(error = %e, "Failed to save console history");
    }

    if !out.quiet && controller.sync_status().is_error() {
        eprintln!("Warning: last sync failed ({}); retrying on exit.", controller.sync_status());
    }
    controller.shutdown().await?;
    Ok(())
}

/// Split a console line into arguments, honouring quotes and backslash escapes
pub(crate) fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"') | None, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_token = true;
                }
                None => return Err("trailing backslash".to_string()),
            },
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
