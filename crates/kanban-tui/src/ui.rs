//! Board rendering

use kanban_core::board::{Priority, Project, Stage};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, Mode};

const KEY_HELP: &str = "←→↑↓ move  Enter open  ]/[ stage  A archive  D delete  n notes  + add  s sync  r refresh  q quit";

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(8),    // Columns
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_columns(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);

    match app.mode() {
        Mode::Board => {}
        Mode::Detail => {
            if let Some(project) = app.controller().selected() {
                render_detail(frame, project);
            }
        }
        Mode::EditNotes { input, .. } => render_input(frame, "Notes (Enter save, Esc cancel)", input),
        Mode::AddProject { stage, input } => {
            render_input(frame, &format!("New project in {} (Enter add, Esc cancel)", stage), input)
        }
        Mode::ConfirmDelete { id } => {
            let title = app
                .controller()
                .get(id)
                .map(|p| p.title.as_str())
                .unwrap_or("project");
            render_confirm(frame, title);
        }
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let controller = app.controller();
    let header = Paragraph::new(Line::from(vec![
        Span::styled("Kanban", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "  {} projects  backend: {}",
            controller.store().len(),
            controller.backend_name()
        )),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

fn render_columns(frame: &mut Frame, app: &App, area: Rect) {
    let areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, Stage::ALL.len() as u32); Stage::ALL.len()])
        .split(area);

    for (index, column) in app.controller().columns().into_iter().enumerate() {
        let focused = index == app.column();
        let border_style = if focused {
            Style::default().fg(stage_color(column.stage))
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(format!("{} ({})", column.stage, column.len()));

        let inner = block.inner(areas[index]);
        frame.render_widget(block, areas[index]);

        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(inner);
        frame.render_widget(
            Paragraph::new(column.stage.description()).style(Style::default().fg(Color::DarkGray)),
            parts[0],
        );

        let items: Vec<ListItem> = column.projects.iter().map(|p| card(p)).collect();
        let list = List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        let mut state = ListState::default();
        if focused && !column.is_empty() {
            state.select(Some(app.row(index)));
        }
        frame.render_stateful_widget(list, parts[1], &mut state);
    }
}

fn card(project: &Project) -> ListItem<'static> {
    let mut meta = Vec::new();
    if let Some(priority) = project.priority {
        meta.push(Span::styled(
            format!("[{}] ", priority),
            Style::default().fg(priority_color(priority)),
        ));
    }
    if let Some(due) = &project.due_date {
        meta.push(Span::raw(format!("due {} ", due)));
    }
    for tag in &project.tags {
        meta.push(Span::styled(format!("#{} ", tag), Style::default().fg(Color::Blue)));
    }
    if project.has_notes() {
        meta.push(Span::styled("✎", Style::default().fg(Color::Yellow)));
    }

    ListItem::new(vec![
        Line::from(Span::styled(
            project.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(meta),
        Line::from(Span::styled(
            format!("updated {}", project.updated_at.format("%Y-%m-%d")),
            Style::default().fg(Color::DarkGray),
        )),
    ])
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let status = app.controller().sync_status();
    let status_style = if status.is_error() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };

    let mut spans = vec![Span::styled(format!("[{}] ", status.label()), status_style)];
    match app.message() {
        Some(message) => spans.push(Span::raw(message.to_string())),
        None => spans.push(Span::styled(KEY_HELP, Style::default().fg(Color::DarkGray))),
    }

    let footer = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}

fn render_detail(frame: &mut Frame, project: &Project) {
    let area = centered_rect(60, 70, frame.area());
    let label = Style::default().fg(Color::DarkGray);
    let field = |name: &str, value: String| {
        Line::from(vec![Span::styled(format!("{:<12}", name), label), Span::raw(value)])
    };
    let or_dash = |value: Option<&str>| value.unwrap_or("-").to_string();

    let tags = if project.tags.is_empty() {
        "-".to_string()
    } else {
        project.tags.iter().map(|t| format!("#{}", t)).collect::<Vec<_>>().join(" ")
    };
    let prev = project.stage.prev().map(|s| format!("[ {}", s)).unwrap_or_default();
    let next = project.stage.next().map(|s| format!("{} ]", s)).unwrap_or_default();

    let lines = vec![
        Line::from(Span::styled(
            project.title.clone(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        field("Stage", project.stage.to_string()),
        field("Priority", or_dash(project.priority.as_ref().map(Priority::as_str))),
        field("Due", or_dash(project.due_date.as_deref())),
        field("Tags", tags),
        field("Description", or_dash(project.description.as_deref())),
        field("Notes", or_dash(project.notes.as_deref())),
        field("Created", project.created_at.format("%Y-%m-%d %H:%M").to_string()),
        field("Updated", project.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        field("Id", project.id.clone()),
        Line::from(""),
        Line::from(Span::styled(format!("{}   {}", prev, next), label)),
        Line::from(Span::styled("A archive  D delete  n notes  Esc close", label)),
    ];

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Project"));
    frame.render_widget(Clear, area);
    frame.render_widget(detail, area);
}

fn render_input(frame: &mut Frame, title: &str, input: &str) {
    let area = centered_rect(60, 20, frame.area());
    let widget = Paragraph::new(format!("{}_", input))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title.to_string()));
    frame.render_widget(Clear, area);
    frame.render_widget(widget, area);
}

fn render_confirm(frame: &mut Frame, title: &str) {
    let area = centered_rect(50, 20, frame.area());
    let widget = Paragraph::new(format!("Delete '{}'? (y/n)", title))
        .style(Style::default().fg(Color::Red))
        .block(Block::default().borders(Borders::ALL).title("Confirm"));
    frame.render_widget(Clear, area);
    frame.render_widget(widget, area);
}

fn stage_color(stage: Stage) -> Color {
    match stage {
        Stage::Wishlist => Color::Magenta,
        Stage::InProgress => Color::Yellow,
        Stage::Finished => Color::Green,
        Stage::Archived => Color::Gray,
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::Green,
    }
}

/// Rect of the given percentage size, centered in `area`
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent};
    use kanban_core::board::NewProject;
    use kanban_core::controller::BoardController;
    use kanban_core::storage::LocalStore;
    use ratatui::{Terminal, backend::TestBackend};
    use tempfile::TempDir;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn app_with_project() -> (App, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut controller = BoardController::new(LocalStore::open(temp_dir.path()).unwrap(), None);
        controller
            .add(
                NewProject::new("Garden shed")
                    .with_priority(Priority::High)
                    .with_tags(["diy"])
                    .with_notes("buy timber"),
            )
            .unwrap();
        (App::new(controller), temp_dir)
    }

    #[test]
    fn test_board_renders_all_columns() {
        let (app, _dir) = app_with_project();
        let text = screen(&app);

        assert!(text.contains("Wishlist (1)"));
        assert!(text.contains("In Progress (0)"));
        assert!(text.contains("Finished (0)"));
        assert!(text.contains("Archived (0)"));
        assert!(text.contains("Garden shed"));
        assert!(text.contains("[High]"));
        assert!(text.contains("#diy"));
        assert!(text.contains("local only"));
    }

    #[test]
    fn test_detail_modal_shows_fields() {
        let (mut app, _dir) = app_with_project();
        app.handle_key(KeyEvent::from(KeyCode::Enter));
        let text = screen(&app);

        assert!(text.contains("Project"));
        assert!(text.contains("buy timber"));
        assert!(text.contains("In Progress ]"));
    }

    #[test]
    fn test_confirm_prompt_names_the_project() {
        let (mut app, _dir) = app_with_project();
        app.handle_key(KeyEvent::from(KeyCode::Char('D')));
        assert!(screen(&app).contains("Delete 'Garden shed'? (y/n)"));
    }

    #[test]
    fn test_centered_rect_is_inside_area() {
        let area = Rect::new(0, 0, 100, 50);
        let rect = centered_rect(60, 20, area);
        assert_eq!(rect.width, 60);
        assert_eq!(rect.height, 10);
        assert_eq!(rect.x, 20);
    }
}
