//! TUI rendering.

use kubeforward_core::SessionState;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
};

use super::app::{App, Field};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Table
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_table(f, app, chunks[1]);
    draw_footer(f, app, chunks[2]);

    if let Some(message) = &app.dialog {
        draw_dialog(f, message);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let title = format!(
        "kubeforward | {} rows | {} active | {} namespaces",
        app.rows.len(),
        app.active_count(),
        app.namespaces.len()
    );

    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan).bold())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );

    f.render_widget(header, area);
}

fn draw_table(f: &mut Frame, app: &App, area: Rect) {
    let header_cells = ["NAMESPACE", "KIND", "RESOURCE", "LOCAL", "REMOTE", "STATE"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).bold()));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = app.rows.iter().enumerate().map(|(i, row)| {
        let is_selected = i == app.selected;

        let values = [
            (Field::Namespace, row.namespace.clone().unwrap_or_else(|| "-".to_string())),
            (Field::Kind, row.kind.list_name().to_string()),
            (Field::Resource, row.resource.clone().unwrap_or_else(|| "-".to_string())),
            (Field::LocalPort, placeholder(&row.local_port)),
            (Field::RemotePort, placeholder(&row.remote_port)),
        ];

        let mut cells: Vec<Cell> = values
            .into_iter()
            .map(|(field, value)| {
                let cell = Cell::from(truncate(&value, 30));
                if is_selected && field == app.field {
                    cell.style(Style::default().add_modifier(Modifier::REVERSED))
                } else {
                    cell
                }
            })
            .collect();
        cells.push(Cell::from(row.state.as_str()).style(Style::default().fg(state_color(&row.state))));

        let style = if is_selected {
            Style::default().bg(Color::DarkGray).fg(Color::White)
        } else {
            Style::default()
        };

        Row::new(cells).style(style)
    });

    let widths = [
        Constraint::Length(20),
        Constraint::Length(12),
        Constraint::Min(20),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Length(11),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Port Forwards "),
        )
        .row_highlight_style(Style::default().add_modifier(Modifier::BOLD));

    let mut state = TableState::default();
    state.select(Some(app.selected));

    f.render_stateful_widget(table, area, &mut state);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let status = app.get_status().unwrap_or("");

    let help = if app.dialog.is_some() {
        "Enter/Esc: dismiss"
    } else {
        "j/k: row | h/l: field | space/[ ]: cycle | 0-9: port | enter: start/stop | a: add | d: delete | r: refresh | q: quit"
    };

    let footer_text = if status.is_empty() {
        help.to_string()
    } else {
        format!("{} | {}", status, help)
    };

    let footer = Paragraph::new(footer_text)
        .style(Style::default().fg(Color::DarkGray))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );

    f.render_widget(footer, area);
}

fn draw_dialog(f: &mut Frame, message: &str) {
    let area = centered(f.area(), 70, 3);
    let dialog = Paragraph::new(message.to_string())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Notice "),
        );

    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

/// A `height`-line box spanning `percent_x` of `area`, centered.
fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = area.width * percent_x / 100;
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height: height.min(area.height),
    }
}

fn state_color(state: &SessionState) -> Color {
    match state {
        SessionState::Idle => Color::DarkGray,
        SessionState::Connecting => Color::Yellow,
        SessionState::Active => Color::Green,
        SessionState::Stopped => Color::Blue,
        SessionState::Failed(_) => Color::Red,
    }
}

fn placeholder(text: &str) -> String {
    if text.is_empty() {
        "_".to_string()
    } else {
        text.to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_fits_inside() {
        let area = Rect::new(0, 0, 100, 40);
        let dialog = centered(area, 70, 3);
        assert_eq!(dialog.width, 70);
        assert_eq!(dialog.height, 3);
        assert_eq!(dialog.x, 15);
        assert!(dialog.y + dialog.height <= area.height);
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(placeholder(""), "_");
        assert_eq!(placeholder("8080"), "8080");
    }
}
